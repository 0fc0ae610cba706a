//! Bookmark store.
//!
//! Bookmarks are a tree of folders with endpoint entries at the leaves,
//! addressed by `/`-separated paths (`work/mirrors/kernel`). The tree lives
//! in an arena: every node carries parent, first-child and next-sibling
//! indices, and traversal walks an explicit stack. Persistence is the host
//! application's concern; the engine only consumes the lookup.

use crate::request::Protocol;

/// Endpoint identity stored under a bookmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkEntry {
    pub protocol: Protocol,
    pub hostname: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub account: String,
    pub directory: String,
    /// Local directory to pair with the remote one when both panes of a
    /// UI follow the bookmark.
    pub local_directory: String,
}

impl BookmarkEntry {
    pub fn new(protocol: Protocol, hostname: impl Into<String>) -> Self {
        Self {
            protocol,
            hostname: hostname.into(),
            port: None,
            username: String::new(),
            password: String::new(),
            account: String::new(),
            directory: String::new(),
            local_directory: String::new(),
        }
    }
}

#[derive(Debug)]
struct Node {
    name: String,
    entry: Option<BookmarkEntry>,
    parent: usize,
    first_child: Option<usize>,
    next_sibling: Option<usize>,
}

/// Arena-backed bookmark tree. Index 0 is the unnamed root folder.
#[derive(Debug)]
pub struct Bookmarks {
    nodes: Vec<Node>,
}

impl Bookmarks {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: String::new(),
                entry: None,
                parent: 0,
                first_child: None,
                next_sibling: None,
            }],
        }
    }

    fn child_by_name(&self, parent: usize, name: &str) -> Option<usize> {
        let mut cursor = self.nodes[parent].first_child;
        while let Some(idx) = cursor {
            if self.nodes[idx].name == name {
                return Some(idx);
            }
            cursor = self.nodes[idx].next_sibling;
        }
        None
    }

    /// Appends a child, keeping sibling order stable.
    fn add_child(&mut self, parent: usize, name: &str) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            entry: None,
            parent,
            first_child: None,
            next_sibling: None,
        });

        match self.nodes[parent].first_child {
            None => self.nodes[parent].first_child = Some(idx),
            Some(first) => {
                let mut tail = first;
                while let Some(next) = self.nodes[tail].next_sibling {
                    tail = next;
                }
                self.nodes[tail].next_sibling = Some(idx);
            }
        }
        idx
    }

    /// Inserts (or replaces) an entry at a `/`-separated path, creating
    /// intermediate folders as needed.
    pub fn insert(&mut self, path: &str, entry: BookmarkEntry) {
        let mut current = 0;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = match self.child_by_name(current, part) {
                Some(idx) => idx,
                None => self.add_child(current, part),
            };
        }
        if current != 0 {
            self.nodes[current].entry = Some(entry);
        }
    }

    /// Looks an entry up by path.
    pub fn lookup(&self, path: &str) -> Option<&BookmarkEntry> {
        let mut current = 0;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = self.child_by_name(current, part)?;
        }
        self.nodes[current].entry.as_ref()
    }

    /// Removes an entry (or a whole folder) at a path. Returns whether
    /// anything was removed. Arena slots are retired in place; the tree
    /// is small and rebuilt from persistent storage at startup.
    pub fn remove(&mut self, path: &str) -> bool {
        let mut current = 0;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            match self.child_by_name(current, part) {
                Some(idx) => current = idx,
                None => return false,
            }
        }
        if current == 0 {
            return false;
        }

        let parent = self.nodes[current].parent;
        let next = self.nodes[current].next_sibling;
        if self.nodes[parent].first_child == Some(current) {
            self.nodes[parent].first_child = next;
        } else {
            let mut cursor = self.nodes[parent].first_child;
            while let Some(idx) = cursor {
                if self.nodes[idx].next_sibling == Some(current) {
                    self.nodes[idx].next_sibling = next;
                    break;
                }
                cursor = self.nodes[idx].next_sibling;
            }
        }
        true
    }

    /// Depth-first walk over the tree by explicit stack, yielding the path
    /// and entry of every bookmark in sibling order.
    pub fn walk(&self) -> Vec<(String, &BookmarkEntry)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, String)> = Vec::new();

        let mut cursor = self.nodes[0].first_child;
        while let Some(idx) = cursor {
            stack.push((idx, self.nodes[idx].name.clone()));
            cursor = self.nodes[idx].next_sibling;
        }
        stack.reverse();

        while let Some((idx, path)) = stack.pop() {
            if let Some(entry) = &self.nodes[idx].entry {
                out.push((path.clone(), entry));
            }

            let mut children = Vec::new();
            let mut cursor = self.nodes[idx].first_child;
            while let Some(child) = cursor {
                children.push((child, format!("{path}/{}", self.nodes[child].name)));
                cursor = self.nodes[child].next_sibling;
            }
            children.reverse();
            stack.extend(children);
        }

        out
    }
}

impl Default for Bookmarks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(host: &str) -> BookmarkEntry {
        BookmarkEntry::new(Protocol::Ftp, host)
    }

    #[test]
    fn insert_and_lookup_nested_paths() {
        let mut bookmarks = Bookmarks::new();
        bookmarks.insert("work/mirrors/kernel", entry("kernel.example.org"));
        bookmarks.insert("work/fileserver", entry("files.example.org"));

        assert_eq!(
            bookmarks.lookup("work/mirrors/kernel").unwrap().hostname,
            "kernel.example.org"
        );
        assert_eq!(
            bookmarks.lookup("work/fileserver").unwrap().hostname,
            "files.example.org"
        );
        assert!(bookmarks.lookup("work/mirrors").is_none());
        assert!(bookmarks.lookup("nope").is_none());
    }

    #[test]
    fn insert_replaces_existing_entry() {
        let mut bookmarks = Bookmarks::new();
        bookmarks.insert("mirror", entry("old.example.org"));
        bookmarks.insert("mirror", entry("new.example.org"));
        assert_eq!(
            bookmarks.lookup("mirror").unwrap().hostname,
            "new.example.org"
        );
    }

    #[test]
    fn walk_preserves_insertion_order() {
        let mut bookmarks = Bookmarks::new();
        bookmarks.insert("b/one", entry("one"));
        bookmarks.insert("b/two", entry("two"));
        bookmarks.insert("a", entry("a"));

        let paths: Vec<String> = bookmarks.walk().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["b/one", "b/two", "a"]);
    }

    #[test]
    fn remove_unlinks_subtree() {
        let mut bookmarks = Bookmarks::new();
        bookmarks.insert("dir/inner", entry("inner"));
        bookmarks.insert("dir/other", entry("other"));

        assert!(bookmarks.remove("dir/inner"));
        assert!(bookmarks.lookup("dir/inner").is_none());
        assert!(bookmarks.lookup("dir/other").is_some());

        assert!(bookmarks.remove("dir"));
        assert!(bookmarks.lookup("dir/other").is_none());
        assert!(!bookmarks.remove("dir"));
    }
}
