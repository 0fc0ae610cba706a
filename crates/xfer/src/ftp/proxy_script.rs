//! FTP proxy login scripts.
//!
//! A proxy login is a short command script with placeholders:
//! `%pu %pp %ph %po %pa` expand to the proxy's username, password, host,
//! port and account; `%hu %hp %hh %ho %ha` to the target's; `%n` ends a
//! command. The `proxy_config` option either names a preset or carries a
//! custom script.

use crate::request::RequestCore;

/// Named presets, matching the classic firewall types.
const PRESETS: &[(&str, &str)] = &[
    ("SITE", "USER %pu%nPASS %pp%nSITE %hh%nUSER %hu%nPASS %hp%n"),
    ("user@host", "USER %pu%nPASS %pp%nUSER %hu@%hh%nPASS %hp%n"),
    ("user@host:port", "USER %hu@%hh:%ho%nPASS %hp%n"),
    (
        "AUTHENTICATE",
        "USER %hu@%hh%nPASS %hp%nSITE AUTHENTICATE %pu%nSITE RESPONSE %pp%n",
    ),
    ("user@host port", "USER %hu@%hh %ho%nPASS %hp%n"),
    ("user@host NOAUTH", "USER %hu@%hh%nPASS %hp%n"),
];

/// Resolves the `proxy_config` option to a script template. Unknown values
/// are taken as a custom script; empty means no proxy login.
pub fn template_for(proxy_config: &str) -> Option<&str> {
    let trimmed = proxy_config.trim();
    if trimmed.is_empty() || trimmed == "none" {
        return None;
    }
    PRESETS
        .iter()
        .find(|(name, _)| *name == trimmed)
        .map(|(_, template)| *template)
        .or(Some(proxy_config))
}

/// Expands a script into the command lines to issue, one per `%n`.
pub fn expand(template: &str, core: &RequestCore) -> Vec<String> {
    let mut commands = Vec::new();
    let mut current = String::new();

    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            current.push(c);
            continue;
        }

        let Some(&class) = chars.peek() else {
            current.push('%');
            break;
        };

        match class.to_ascii_lowercase() {
            'n' => {
                chars.next();
                if !current.is_empty() {
                    commands.push(std::mem::take(&mut current));
                }
            }
            'p' | 'h' => {
                chars.next();
                let Some(field) = chars.next() else {
                    break;
                };
                let value = placeholder_value(core, class, field);
                current.push_str(&value);
            }
            _ => current.push('%'),
        }
    }

    if !current.is_empty() {
        commands.push(current);
    }
    commands
}

fn placeholder_value(core: &RequestCore, class: char, field: char) -> String {
    let proxy = class.to_ascii_lowercase() == 'p';
    match field.to_ascii_lowercase() {
        'u' if proxy => core.opt_text("ftp_proxy_username"),
        'p' if proxy => core.opt_text("ftp_proxy_password"),
        'h' if proxy => core.opt_text("ftp_proxy_host"),
        'o' if proxy => core.opt_int("ftp_proxy_port").to_string(),
        'a' if proxy => core.opt_text("ftp_proxy_account"),
        'u' => core.username.clone(),
        'p' => core.password.clone(),
        'h' => core.hostname.clone(),
        'o' => core.port_or_default().to_string(),
        'a' => core.account.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::options::Value;
    use crate::request::Protocol;
    use std::sync::Arc;

    fn core() -> RequestCore {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(Context::new(dir.path().to_path_buf()));
        ctx.set_option("ftp_proxy_username", Value::Text("pxuser".into()));
        ctx.set_option("ftp_proxy_password", Value::Text("pxpass".into()));
        ctx.set_option("ftp_proxy_host", Value::Text("fw.corp".into()));
        ctx.set_option("ftp_proxy_port", Value::Int(2121));

        let mut core = RequestCore::new(Protocol::Ftp, ctx);
        core.hostname = "ftp.example.org".into();
        core.username = "alice".into();
        core.password = "secret".into();
        core
    }

    #[test]
    fn user_at_host_preset() {
        let template = template_for("user@host").unwrap();
        let commands = expand(template, &core());
        assert_eq!(
            commands,
            vec![
                "USER pxuser",
                "PASS pxpass",
                "USER alice@ftp.example.org",
                "PASS secret",
            ]
        );
    }

    #[test]
    fn user_at_host_port_preset() {
        let template = template_for("user@host:port").unwrap();
        let commands = expand(template, &core());
        assert_eq!(commands, vec!["USER alice@ftp.example.org:21", "PASS secret"]);
    }

    #[test]
    fn custom_script_passes_through() {
        let commands = expand("OPEN %hh%nUSER %hu%nPASS %hp%n", &core());
        assert_eq!(
            commands,
            vec!["OPEN ftp.example.org", "USER alice", "PASS secret"]
        );
    }

    #[test]
    fn empty_config_means_no_script() {
        assert_eq!(template_for(""), None);
        assert_eq!(template_for("none"), None);
    }

    #[test]
    fn unknown_config_is_a_custom_script() {
        assert_eq!(template_for("USER %hu%n"), Some("USER %hu%n"));
    }

    #[test]
    fn literal_percent_survives() {
        let commands = expand("TYPE 100%% done%n", &core());
        assert_eq!(commands, vec!["TYPE 100%% done"]);
    }
}
