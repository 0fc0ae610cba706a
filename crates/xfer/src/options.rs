//! Typed option registry.
//!
//! Options are registered once, in a fixed order, with a typed default.
//! Values are sum-typed; the getters and setters name the variant they
//! expect, and a mismatch is a programming error that panics rather than a
//! runtime condition to handle. User-supplied strings go through
//! [`OptionTable::set_from_str`], which validates against the registered
//! type and fails softly.

use std::collections::HashMap;

/// A typed option value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// Multi-entry options (`dont_use_proxy`, `ext`).
    List(Vec<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::List(_) => "list",
        }
    }

    fn same_type(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Registration record for one option.
#[derive(Debug, Clone)]
pub struct OptionMeta {
    pub name: &'static str,
    pub description: &'static str,
    pub default: Value,
}

fn meta(name: &'static str, description: &'static str, default: Value) -> OptionMeta {
    OptionMeta {
        name,
        description,
        default,
    }
}

/// The options the engine consults, in registration order.
pub fn builtin_options() -> Vec<OptionMeta> {
    use Value::*;
    vec![
        meta(
            "network_timeout",
            "Seconds to wait on any network read or write",
            Int(60),
        ),
        meta(
            "retries",
            "Maximum attempts per file; 0 retries forever",
            Int(3),
        ),
        meta("sleep_time", "Seconds between retries", Int(30)),
        meta(
            "maxkbs",
            "Transfer rate cap in KB/s; 0 is unlimited",
            Float(0.0),
        ),
        meta(
            "passive_transfer",
            "Try FTP passive mode before falling back to active mode",
            Bool(true),
        ),
        meta(
            "ascii_transfers",
            "Default FTP transfers to ASCII mode",
            Bool(false),
        ),
        meta(
            "resolve_symlinks",
            "Ask the FTP server to resolve symbolic links in listings",
            Bool(false),
        ),
        meta(
            "show_hidden_files",
            "Include hidden files in FTP listings",
            Bool(true),
        ),
        meta("enable_ipv6", "Resolve and prefer IPv6 addresses", Bool(false)),
        meta(
            "email",
            "Password sent for anonymous FTP logins",
            Text("anonymous@localhost".to_string()),
        ),
        meta("use_cache", "Serve directory listings from the cache", Bool(true)),
        meta("ftp_proxy_host", "FTP proxy hostname", Text(String::new())),
        meta("ftp_proxy_port", "FTP proxy port", Int(21)),
        meta("ftp_proxy_username", "FTP proxy username", Text(String::new())),
        meta("ftp_proxy_password", "FTP proxy password", Text(String::new())),
        meta("ftp_proxy_account", "FTP proxy account", Text(String::new())),
        meta("http_proxy_host", "HTTP proxy hostname", Text(String::new())),
        meta("http_proxy_port", "HTTP proxy port", Int(80)),
        meta(
            "http_proxy_username",
            "HTTP proxy username",
            Text(String::new()),
        ),
        meta(
            "http_proxy_password",
            "HTTP proxy password",
            Text(String::new()),
        ),
        meta(
            "proxy_config",
            "FTP proxy login preset or a custom login script",
            Text(String::new()),
        ),
        meta("use_http11", "Speak HTTP/1.1 (enables resume)", Bool(true)),
        meta(
            "remote_charsets",
            "Comma-separated fallback charsets for remote listings",
            Text(String::new()),
        ),
        meta(
            "remote_lc_time",
            "Locale used by the server for listing dates",
            Text(String::new()),
        ),
        meta(
            "one_transfer",
            "Run at most one file transfer at a time",
            Bool(true),
        ),
        meta(
            "append_transfers",
            "Merge new files into a running transfer to the same endpoint",
            Bool(true),
        ),
        meta(
            "dont_use_proxy",
            "Proxy bypass entries: domain suffixes or a.b.c.d/prefix networks",
            List(Vec::new()),
        ),
        meta(
            "ext",
            "Per-extension rules: suffix:icon:A|B:viewer",
            List(Vec::new()),
        ),
        meta(
            "default_protocol",
            "Protocol assumed for URLs without a scheme",
            Text("ftp".to_string()),
        ),
        meta("ssh_prog_name", "Path of the ssh client binary", Text("ssh".to_string())),
        meta(
            "sftp_server_path",
            "Explicit path of the remote sftp-server binary",
            Text(String::new()),
        ),
        meta(
            "ssh_extra_params",
            "Additional arguments passed to ssh",
            List(Vec::new()),
        ),
    ]
}

/// A set of option values backed by the registered metadata.
#[derive(Debug)]
pub struct OptionTable {
    metas: Vec<OptionMeta>,
    values: HashMap<&'static str, Value>,
}

impl OptionTable {
    pub fn new() -> Self {
        let metas = builtin_options();
        let values = metas
            .iter()
            .map(|m| (m.name, m.default.clone()))
            .collect();
        Self { metas, values }
    }

    pub fn metas(&self) -> &[OptionMeta] {
        &self.metas
    }

    fn meta_of(&self, name: &str) -> &OptionMeta {
        self.metas
            .iter()
            .find(|m| m.name == name)
            .unwrap_or_else(|| panic!("option {name:?} is not registered"))
    }

    /// Sets a value, panicking on unknown names or a variant mismatch.
    pub fn set(&mut self, name: &str, value: Value) {
        let meta = self.meta_of(name);
        let key = meta.name;
        let expected = meta.default.type_name();
        assert!(
            meta.default.same_type(&value),
            "option {name:?} is {expected} but was set with {}",
            value.type_name()
        );
        self.values.insert(key, value);
    }

    /// Parses and sets a user-supplied string according to the registered
    /// type. Returns false when the string does not parse.
    pub fn set_from_str(&mut self, name: &str, raw: &str) -> bool {
        let parsed = match self.meta_of(name).default {
            Value::Int(_) => raw.parse().map(Value::Int).ok(),
            Value::Float(_) => raw.parse().map(Value::Float).ok(),
            Value::Bool(_) => match raw {
                "1" | "true" | "on" | "yes" => Some(Value::Bool(true)),
                "0" | "false" | "off" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            Value::Text(_) => Some(Value::Text(raw.to_string())),
            Value::List(_) => Some(Value::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )),
        };
        match parsed {
            Some(value) => {
                self.set(name, value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> &Value {
        self.meta_of(name);
        &self.values[name]
    }

    pub fn int(&self, name: &str) -> i64 {
        match self.get(name) {
            Value::Int(v) => *v,
            other => panic!("option {name:?} is {}, not int", other.type_name()),
        }
    }

    pub fn float(&self, name: &str) -> f64 {
        match self.get(name) {
            Value::Float(v) => *v,
            other => panic!("option {name:?} is {}, not float", other.type_name()),
        }
    }

    pub fn bool(&self, name: &str) -> bool {
        match self.get(name) {
            Value::Bool(v) => *v,
            other => panic!("option {name:?} is {}, not bool", other.type_name()),
        }
    }

    pub fn text(&self, name: &str) -> String {
        match self.get(name) {
            Value::Text(v) => v.clone(),
            other => panic!("option {name:?} is {}, not text", other.type_name()),
        }
    }

    pub fn list(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Value::List(v) => v.clone(),
            other => panic!("option {name:?} is {}, not list", other.type_name()),
        }
    }
}

impl Default for OptionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `s` on `delim`, honoring backslash escapes (`\:` is a literal
/// colon inside a field). Used for the colon-separated `ext` entries.
pub fn split_escaped(s: &str, delim: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) if next == delim => current.push(delim),
                Some(next) => {
                    current.push('\\');
                    current.push(next);
                }
                None => current.push('\\'),
            }
        } else if c == delim {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}
