// Copyright 2025 The GitStore Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The gitconfig text format and its scope layering.
//!
//! Entries keep their insertion order so a round-trip preserves the file
//! shape. Section and key names compare case-insensitively; subsection names
//! are case-sensitive, matching git.

/// One `key = value` under a `[section]` or `[section "subsection"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub section: String,
    pub subsection: Option<String>,
    pub key: String,
    pub value: String,
}

/// A parsed gitconfig file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    entries: Vec<ConfigEntry>,
}

/// Built-in values applied at read time when no layer has the key.
pub fn default_value(path: &str) -> Option<&'static str> {
    match path {
        "core.filemode" => Some("false"),
        "core.symlinks" => Some("false"),
        "core.ignorecase" => Some("true"),
        "core.bare" => Some("false"),
        "core.repositoryformatversion" => Some("0"),
        "core.logallrefupdates" => Some("true"),
        "init.defaultbranch" => Some("master"),
        _ => None,
    }
}

/// Splits a dotted path into `(section, subsection, key)`. The subsection,
/// when present, is everything between the first and last dot and may itself
/// contain dots.
fn split_path(path: &str) -> (String, Option<String>, String) {
    let Some((section, rest)) = path.split_once('.') else {
        return (path.to_ascii_lowercase(), None, String::new());
    };
    match rest.rsplit_once('.') {
        Some((subsection, key)) => (
            section.to_ascii_lowercase(),
            Some(subsection.to_string()),
            key.to_ascii_lowercase(),
        ),
        None => (
            section.to_ascii_lowercase(),
            None,
            rest.to_ascii_lowercase(),
        ),
    }
}

impl ConfigEntry {
    fn matches(&self, section: &str, subsection: Option<&str>, key: &str) -> bool {
        self.section == section && self.subsection.as_deref() == subsection && self.key == key
    }
}

impl ConfigFile {
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        let mut section = String::new();
        let mut subsection: Option<String> = None;
        for raw_line in text.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                match header.split_once(' ') {
                    Some((name, sub)) => {
                        section = name.trim().to_ascii_lowercase();
                        subsection = Some(sub.trim().trim_matches('"').to_string());
                    }
                    None => {
                        section = header.trim().to_ascii_lowercase();
                        subsection = None;
                    }
                }
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), unquote(value.trim())),
                // A bare key means boolean true in git.
                None => (line, "true".to_string()),
            };
            entries.push(ConfigEntry {
                section: section.clone(),
                subsection: subsection.clone(),
                key: key.to_ascii_lowercase(),
                value,
            });
        }
        Self { entries }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        let mut current: Option<(String, Option<String>)> = None;
        for entry in &self.entries {
            let header = (entry.section.clone(), entry.subsection.clone());
            if current.as_ref() != Some(&header) {
                match &entry.subsection {
                    Some(sub) => out.push_str(&format!("[{} \"{sub}\"]\n", entry.section)),
                    None => out.push_str(&format!("[{}]\n", entry.section)),
                }
                current = Some(header);
            }
            out.push_str(&format!("\t{} = {}\n", entry.key, entry.value));
        }
        out
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    /// The last value for `path`, without defaults.
    pub fn get(&self, path: &str) -> Option<&str> {
        let (section, subsection, key) = split_path(path);
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.matches(&section, subsection.as_deref(), &key))
            .map(|entry| entry.value.as_str())
    }

    /// Every value for `path`, in insertion order.
    pub fn get_all(&self, path: &str) -> Vec<&str> {
        let (section, subsection, key) = split_path(path);
        self.entries
            .iter()
            .filter(|entry| entry.matches(&section, subsection.as_deref(), &key))
            .map(|entry| entry.value.as_str())
            .collect()
    }

    /// Replaces the last matching entry, or appends a new one at the end of
    /// its section (creating the section at the end of the file).
    pub fn set(&mut self, path: &str, value: &str) {
        let (section, subsection, key) = split_path(path);
        if let Some(entry) = self
            .entries
            .iter_mut()
            .rev()
            .find(|entry| entry.matches(&section, subsection.as_deref(), &key))
        {
            entry.value = value.to_string();
            return;
        }
        let insert_at = self
            .entries
            .iter()
            .rposition(|entry| entry.section == section && entry.subsection.as_deref() == subsection.as_deref())
            .map_or(self.entries.len(), |pos| pos + 1);
        self.entries.insert(
            insert_at,
            ConfigEntry {
                section,
                subsection,
                key,
                value: value.to_string(),
            },
        );
    }

    /// Appends another value for `path` without replacing existing ones.
    pub fn add(&mut self, path: &str, value: &str) {
        let (section, subsection, key) = split_path(path);
        let insert_at = self
            .entries
            .iter()
            .rposition(|entry| entry.section == section && entry.subsection.as_deref() == subsection.as_deref())
            .map_or(self.entries.len(), |pos| pos + 1);
        self.entries.insert(
            insert_at,
            ConfigEntry {
                section,
                subsection,
                key,
                value: value.to_string(),
            },
        );
    }

    /// Removes every entry for `path`.
    pub fn unset(&mut self, path: &str) {
        let (section, subsection, key) = split_path(path);
        self.entries
            .retain(|entry| !entry.matches(&section, subsection.as_deref(), &key));
    }
}

fn strip_comment(line: &str) -> &str {
    // Good enough for values this crate writes; quoted ; and # are rare in
    // repository-local config.
    match line.find([';', '#']) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// The read-time view over the scope stack. Worktree beats local beats
/// global beats system; a miss everywhere falls back to the defaults table.
/// Only the local scope is writable through this crate.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayers {
    pub system: Option<ConfigFile>,
    pub global: Option<ConfigFile>,
    pub local: ConfigFile,
    pub worktree: Option<ConfigFile>,
}

impl ConfigLayers {
    pub fn get(&self, path: &str) -> Option<String> {
        [
            self.worktree.as_ref(),
            Some(&self.local),
            self.global.as_ref(),
            self.system.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find_map(|layer| layer.get(path))
        .map(str::to_string)
        .or_else(|| default_value(&path.to_ascii_lowercase()).map(str::to_string))
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        match self.get(path)?.as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" | "" => Some(false),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[core]
\trepositoryformatversion = 0
\tbare = true
[remote \"origin\"]
\turl = https://example.com/repo.git
\tfetch = +refs/heads/*:refs/remotes/origin/*
";

    #[test]
    fn test_parse_get() {
        let file = ConfigFile::parse(SAMPLE);
        assert_eq!(file.get("core.bare"), Some("true"));
        assert_eq!(file.get("core.repositoryformatversion"), Some("0"));
        assert_eq!(
            file.get("remote.origin.url"),
            Some("https://example.com/repo.git")
        );
        assert_eq!(file.get("core.missing"), None);
        // Section and key names are case-insensitive, subsections are not.
        assert_eq!(file.get("CORE.Bare"), Some("true"));
        assert_eq!(file.get("remote.ORIGIN.url"), None);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let file = ConfigFile::parse(SAMPLE);
        assert_eq!(ConfigFile::parse(&file.serialize()), file);
        assert_eq!(file.serialize(), SAMPLE);
    }

    #[test]
    fn test_set_replaces_and_appends_in_section() {
        let mut file = ConfigFile::parse(SAMPLE);
        file.set("core.bare", "false");
        assert_eq!(file.get("core.bare"), Some("false"));
        file.set("core.filemode", "true");
        let serialized = file.serialize();
        // New key lands inside [core], not at the end of the file.
        assert!(serialized.find("filemode").unwrap() < serialized.find("[remote").unwrap());
    }

    #[test]
    fn test_multi_value() {
        let mut file = ConfigFile::parse(SAMPLE);
        file.add(
            "remote.origin.fetch",
            "+refs/tags/*:refs/tags/*",
        );
        assert_eq!(file.get_all("remote.origin.fetch").len(), 2);
        // get returns the last value.
        assert_eq!(
            file.get("remote.origin.fetch"),
            Some("+refs/tags/*:refs/tags/*")
        );
        file.unset("remote.origin.fetch");
        assert!(file.get_all("remote.origin.fetch").is_empty());
    }

    #[test]
    fn test_comments_and_bare_keys() {
        let file = ConfigFile::parse("[core]\n\tbare ; trailing\n# comment\n\tignorecase = true\n");
        assert_eq!(file.get("core.bare"), Some("true"));
        assert_eq!(file.get("core.ignorecase"), Some("true"));
    }

    #[test]
    fn test_layering_and_defaults() {
        let mut layers = ConfigLayers::default();
        assert_eq!(layers.get("core.filemode"), Some("false".to_string()));
        assert_eq!(layers.get("init.defaultBranch"), Some("master".to_string()));
        assert_eq!(layers.get("user.name"), None);

        layers.global = Some(ConfigFile::parse("[user]\n\tname = Global\n"));
        assert_eq!(layers.get("user.name"), Some("Global".to_string()));
        layers.local.set("user.name", "Local");
        assert_eq!(layers.get("user.name"), Some("Local".to_string()));
        layers.worktree = Some(ConfigFile::parse("[user]\n\tname = Worktree\n"));
        assert_eq!(layers.get("user.name"), Some("Worktree".to_string()));
    }
}
