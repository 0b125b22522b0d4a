//! State declaration files.
//!
//! ```text
//! # pop-states
//! reward = "states/reward"          # dialog shown after collecting
//! # pop-change
//! reward_close = "changes/reward_close"
//! # page-states
//! home = "states/home"
//! # page-change
//! home_map_01 = "changes/home_map_01"
//! ```
//!
//! State values name a `.png` reference image, transition values name a
//! labelme `.json` click target. Relative values resolve against an
//! [`AssetRoot`]: by default the project root one level above the
//! declaration file (`tasks/states.txt` declares `tasks/states/home`).

use std::collections::{BTreeSet, HashMap};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::NavError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    InterruptStates,
    InterruptDismissals,
    PageStates,
    PageTransitions,
}

impl Section {
    fn from_marker(tag: &str) -> Option<Section> {
        match tag {
            "pop-states" | "interrupt-states" => Some(Section::InterruptStates),
            "pop-change" | "interrupt-dismissals" => Some(Section::InterruptDismissals),
            "page-states" => Some(Section::PageStates),
            "page-change" | "page-transitions" => Some(Section::PageTransitions),
            _ => None,
        }
    }
}

/// Insertion-ordered key/value table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl Table {
    /// A repeated key keeps its first position and takes the new value.
    fn insert(&mut self, key: String, value: String) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Anchor for relative paths inside a declaration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetRoot {
    /// Parent of the directory holding the declaration file.
    #[default]
    Project,
    /// The directory holding the declaration file.
    Local,
}

impl AssetRoot {
    pub fn base_for(self, declaration: &Path) -> PathBuf {
        let dir = declaration.parent().unwrap_or(Path::new(""));
        match self {
            AssetRoot::Local => dir.to_path_buf(),
            AssetRoot::Project => dir.parent().unwrap_or(dir).to_path_buf(),
        }
    }
}

/// Parsed declaration file. Table order is match priority.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    pub interrupt_states: Table,
    pub interrupt_dismissals: Table,
    pub page_states: Table,
    pub page_transitions: Table,
    pub base_dir: PathBuf,
}

impl Declarations {
    pub fn load(path: &Path, root: AssetRoot) -> Result<Self, NavError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| NavError::ConfigParse { path: path.to_path_buf(), source })?;
        Ok(Self::parse(&text, root.base_for(path)))
    }

    pub fn parse(text: &str, base_dir: PathBuf) -> Self {
        let mut decl = Declarations { base_dir, ..Default::default() };
        let mut section: Option<Section> = None;

        for line in text.lines() {
            let raw = line.trim();

            if let Some(tag) = raw.strip_prefix('#') {
                if let Some(s) = Section::from_marker(tag.trim_start_matches('#').trim()) {
                    section = Some(s);
                }
                continue;
            }

            let clean = raw.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = clean.split_once('=') else { continue };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = value.trim().trim_matches('"').to_string();

            let table = match section {
                Some(Section::InterruptStates) => &mut decl.interrupt_states,
                Some(Section::InterruptDismissals) => &mut decl.interrupt_dismissals,
                Some(Section::PageStates) => &mut decl.page_states,
                Some(Section::PageTransitions) => &mut decl.page_transitions,
                None => continue,
            };
            table.insert(key.to_string(), value);
        }

        decl
    }

    pub fn interrupt_order(&self) -> Vec<&str> {
        self.interrupt_states.keys().collect()
    }

    pub fn page_order(&self) -> Vec<&str> {
        self.page_states.keys().collect()
    }

    pub fn resolve(&self, value: &str) -> PathBuf {
        let p = Path::new(value);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    pub fn state_image(&self, value: &str) -> PathBuf {
        self.resolve(value).with_extension("png")
    }

    pub fn transition_annotation(&self, value: &str) -> PathBuf {
        self.resolve(value).with_extension("json")
    }

    /// First dismissal declared for `interrupt`, keyed `<interrupt>_<anything>`.
    pub fn dismissal_for(&self, interrupt: &str) -> Option<(&str, &str)> {
        let prefix = format!("{}_", interrupt);
        self.interrupt_dismissals.iter().find(|(k, _)| k.starts_with(&prefix))
    }

    /// Compare declarations with the files on disk.
    pub fn audit(&self) -> AuditReport {
        let mut report = AuditReport::default();
        let mut declared_png = BTreeSet::new();
        let mut declared_json = BTreeSet::new();
        let mut dirs = BTreeSet::new();

        for (key, value) in self.interrupt_states.iter().chain(self.page_states.iter()) {
            let p = self.state_image(value);
            if !p.is_file() {
                report.missing_images.push((key.to_string(), p.clone()));
            }
            if let Some(d) = p.parent() {
                dirs.insert(d.to_path_buf());
            }
            declared_png.insert(p);
        }
        for (key, value) in self.interrupt_dismissals.iter().chain(self.page_transitions.iter()) {
            let p = self.transition_annotation(value);
            if !p.is_file() {
                report.missing_annotations.push((key.to_string(), p.clone()));
            }
            if let Some(d) = p.parent() {
                dirs.insert(d.to_path_buf());
            }
            declared_json.insert(p);
        }

        for dir in dirs {
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                match ext {
                    // A png with a sidecar json is a template crop, not a transition
                    "png" if !declared_png.contains(&path) => report.undeclared.push(path),
                    "json" if !declared_json.contains(&path)
                        && !declared_png.contains(&path.with_extension("png")) =>
                    {
                        report.undeclared.push(path)
                    }
                    _ => {}
                }
            }
        }
        report.undeclared.sort();
        report
    }

    /// Append entries for the undeclared files of `report` to the
    /// declaration file at `path`. Images become page states named after
    /// their stem. Transition files cannot be named from disk alone, so
    /// they are appended commented out under a placeholder key. A json
    /// sidecar of an undeclared image is left alone. Returns the number of
    /// lines written.
    pub fn append_fixes(&self, path: &Path, report: &AuditReport) -> io::Result<usize> {
        let mut states = Vec::new();
        let mut changes = Vec::new();
        for file in &report.undeclared {
            let value = self.relative_value(file);
            match file.extension().and_then(|e| e.to_str()) {
                Some("png") => {
                    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed");
                    states.push(format!("{} = \"{}\"", stem, value));
                }
                Some("json") if !report.undeclared.contains(&file.with_extension("png")) => {
                    changes.push(format!("# TODO_TODO_01 = \"{}\"", value));
                }
                _ => {}
            }
        }
        if states.is_empty() && changes.is_empty() {
            return Ok(0);
        }

        let mut text = String::new();
        if !states.is_empty() {
            text.push_str("\n# page-states\n");
            for line in &states {
                text.push_str(line);
                text.push('\n');
            }
        }
        if !changes.is_empty() {
            text.push_str("\n# page-transitions\n# rename and uncomment once the endpoints are known\n");
            for line in &changes {
                text.push_str(line);
                text.push('\n');
            }
        }

        let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
        file.write_all(text.as_bytes())?;
        Ok(states.len() + changes.len())
    }

    /// Declaration value for a file on disk: relative to the base
    /// directory when possible, extension dropped.
    fn relative_value(&self, file: &Path) -> String {
        let stem = file.with_extension("");
        let rel = stem.strip_prefix(&self.base_dir).unwrap_or(&stem);
        rel.to_string_lossy().replace('\\', "/")
    }
}

#[derive(Debug, Default, Clone)]
pub struct AuditReport {
    pub missing_images: Vec<(String, PathBuf)>,
    pub missing_annotations: Vec<(String, PathBuf)>,
    pub undeclared: Vec<PathBuf>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.missing_images.is_empty() && self.missing_annotations.is_empty() && self.undeclared.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
orphan = "before any section"
# pop-states
reward = "states/reward"   # shown after a harvest
levelup = "states/levelup"
# pop-change
reward_close = "changes/reward_close"
reward_other = "changes/reward_other"
## page-states
home = "states/home"
this line has no separator
# just a comment, stays in page-states
map = "states/map"
home = "states/home_v2"

# page-change
home_map_01 = "changes/home_map_01"
map_home_01 = changes/map_home_01
"#;

    fn sample() -> Declarations {
        Declarations::parse(SAMPLE, PathBuf::from("/proj/tasks"))
    }

    #[test]
    fn test_sections_and_order() {
        let d = sample();
        assert_eq!(d.interrupt_order(), vec!["reward", "levelup"]);
        assert_eq!(d.page_order(), vec!["home", "map"]);
        assert_eq!(d.interrupt_dismissals.len(), 2);
        assert_eq!(d.page_transitions.keys().collect::<Vec<_>>(), vec!["home_map_01", "map_home_01"]);
    }

    #[test]
    fn test_values_and_comments() {
        let d = sample();
        assert_eq!(d.interrupt_states.get("reward"), Some("states/reward"));
        assert_eq!(d.page_transitions.get("map_home_01"), Some("changes/map_home_01"));
        assert!(!d.page_states.contains("orphan"));
        assert!(!d.page_states.contains("this line has no separator"));
    }

    #[test]
    fn test_repeated_key_keeps_position() {
        let d = sample();
        assert_eq!(d.page_order()[0], "home");
        assert_eq!(d.page_states.get("home"), Some("states/home_v2"));
    }

    #[test]
    fn test_paths() {
        let d = sample();
        assert_eq!(d.state_image("states/home"), PathBuf::from("/proj/tasks/states/home.png"));
        assert_eq!(
            d.transition_annotation("changes/home_map_01"),
            PathBuf::from("/proj/tasks/changes/home_map_01.json")
        );
        assert_eq!(d.state_image("/abs/x"), PathBuf::from("/abs/x.png"));
    }

    #[test]
    fn test_dismissal_prefix() {
        let d = sample();
        assert_eq!(d.dismissal_for("reward"), Some(("reward_close", "changes/reward_close")));
        assert_eq!(d.dismissal_for("levelup"), None);
        assert_eq!(d.dismissal_for("rew"), None);
    }

    #[test]
    fn test_unreadable_source() {
        let err = Declarations::load(Path::new("/no/such/states.txt"), AssetRoot::Local).unwrap_err();
        assert!(matches!(err, NavError::ConfigParse { .. }));
    }

    #[test]
    fn test_audit() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("states")).unwrap();
        std::fs::create_dir_all(root.join("changes")).unwrap();
        std::fs::write(root.join("states/home.png"), b"").unwrap();
        std::fs::write(root.join("states/home.json"), b"{}").unwrap();
        std::fs::write(root.join("states/stray.png"), b"").unwrap();
        std::fs::write(root.join("changes/home_map_01.json"), b"{}").unwrap();
        std::fs::write(root.join("changes/extra.json"), b"{}").unwrap();
        std::fs::write(
            root.join("states.txt"),
            "# page-states\nhome = \"states/home\"\nmap = \"states/map\"\n\
             # page-change\nhome_map_01 = \"changes/home_map_01\"\nmap_home_01 = \"changes/map_home_01\"\n",
        )
        .unwrap();

        let report = Declarations::load(&root.join("states.txt"), AssetRoot::Local).unwrap().audit();
        assert!(!report.is_clean());
        assert_eq!(report.missing_images.len(), 1);
        assert_eq!(report.missing_images[0].0, "map");
        assert_eq!(report.missing_annotations.len(), 1);
        assert_eq!(report.missing_annotations[0].0, "map_home_01");
        let names: Vec<_> = report
            .undeclared
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["extra.json", "stray.png"]);
    }

    #[test]
    fn test_asset_root() {
        let decl = Path::new("/proj/tasks/states.txt");
        assert_eq!(AssetRoot::Project.base_for(decl), PathBuf::from("/proj"));
        assert_eq!(AssetRoot::Local.base_for(decl), PathBuf::from("/proj/tasks"));
        assert_eq!(AssetRoot::Project.base_for(Path::new("states.txt")), PathBuf::from(""));
        assert_eq!(AssetRoot::default(), AssetRoot::Project);
    }

    #[test]
    fn test_project_root_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("tasks/states")).unwrap();
        std::fs::write(root.join("tasks/states/home.png"), b"").unwrap();
        let text = "# page-states\nhome = \"tasks/states/home\"\n";
        std::fs::write(root.join("tasks/states.txt"), text).unwrap();

        let decl = Declarations::load(&root.join("tasks/states.txt"), AssetRoot::Project).unwrap();
        assert_eq!(decl.base_dir, root);
        assert_eq!(decl.state_image("tasks/states/home"), root.join("tasks/states/home.png"));
        assert!(decl.audit().is_clean());

        // the same file read locally points one level too deep
        let local = Declarations::load(&root.join("tasks/states.txt"), AssetRoot::Local).unwrap();
        assert_eq!(local.audit().missing_images.len(), 1);
    }

    #[test]
    fn test_append_fixes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("states")).unwrap();
        std::fs::create_dir_all(root.join("changes")).unwrap();
        for f in ["states/home.png", "states/shop.png", "states/bag.png", "states/bag.json"] {
            std::fs::write(root.join(f), b"").unwrap();
        }
        std::fs::write(root.join("changes/home_shop_01.json"), b"{}").unwrap();
        std::fs::write(root.join("changes/shop_button.json"), b"{}").unwrap();
        let path = root.join("states.txt");
        std::fs::write(
            &path,
            "# page-states\nhome = \"states/home\"\n# page-change\nhome_shop_01 = \"changes/home_shop_01\"\n",
        )
        .unwrap();

        let decl = Declarations::load(&path, AssetRoot::Local).unwrap();
        let report = decl.audit();
        assert_eq!(decl.append_fixes(&path, &report).unwrap(), 3);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("bag = \"states/bag\"\n"));
        assert!(text.contains("shop = \"states/shop\"\n"));
        assert!(text.contains("# TODO_TODO_01 = \"changes/shop_button\"\n"));

        let fixed = Declarations::load(&path, AssetRoot::Local).unwrap();
        assert_eq!(fixed.page_order(), vec!["home", "bag", "shop"]);
        assert_eq!(fixed.page_transitions.len(), 1);
        let report = fixed.audit();
        assert!(report.missing_images.is_empty());
        assert_eq!(report.undeclared, vec![root.join("changes/shop_button.json")]);

        // nothing left to add but the placeholder
        assert_eq!(fixed.append_fixes(&path, &Default::default()).unwrap(), 0);
    }
}
