//! Translates flags from a local `.env` file into compile-time defines.
//!
//! This file is compiled twice: as part of the library (where it is tested)
//! and by `build.rs` through a `#[path]` include, where it feeds `rustc-cfg`.

use std::{collections::BTreeSet, fs, path::Path};

use anyhow::Context;
use log::*;

/// A key the translator understands and the define it turns into.
#[derive(Debug, PartialEq, Eq)]
pub struct RecognizedFlag {
    /// Line prefix looked for in the env file.
    pub key: &'static str,
    /// Name handed to the build environment.
    pub define: &'static str,
    /// Logged when the flag is applied.
    pub action: &'static str,
}

impl RecognizedFlag {
    pub fn matches(&self, line: &str) -> bool {
        line.starts_with(self.key)
    }
}

pub const RECOGNIZED_FLAGS: &[RecognizedFlag] = &[
    RecognizedFlag {
        key: "BUTTON_NORMAL_STATE_OPEN",
        define: "BUTTON_NORMAL_OPEN",
        action: "swapping normal state for button",
    },
    RecognizedFlag {
        key: "SWAP_XY_POSITION",
        define: "SWAP_XY_POSITION",
        action: "swapping x and y positions",
    },
];

/// Whatever the build is collecting defines into.
pub trait BuildEnvironment {
    fn define(&mut self, name: &str);
}

/// Plain set of define names. Registering a name twice is a no-op.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DefineSet(BTreeSet<String>);

impl DefineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl BuildEnvironment for DefineSet {
    fn define(&mut self, name: &str) {
        self.0.insert(name.to_owned());
    }
}

/// Build-script directives for Cargo, collected in the order they are printed.
///
/// The env file is only watched when it exists: Cargo treats a missing
/// watched file as always stale and would rerun the build script on every
/// build. Creating `.env` later therefore needs a `cargo clean -p`.
#[derive(Debug, Default)]
pub struct CargoDirectives {
    lines: Vec<String>,
    defined: DefineSet,
}

impl CargoDirectives {
    pub fn new(env_file: &Path, flags: &[RecognizedFlag]) -> Self {
        let mut directives = Self::default();
        if env_file.is_file() {
            directives
                .lines
                .push(format!("cargo:rerun-if-changed={}", env_file.display()));
        }
        for flag in flags {
            directives
                .lines
                .push(format!("cargo:rustc-check-cfg=cfg({})", flag.define));
        }
        directives
    }

    /// Surfaces an applied flag in the normal build output.
    pub fn warn(&mut self, flag: &RecognizedFlag) {
        self.lines.push(format!("cargo:warning={} ({})", flag.action, flag.key));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl BuildEnvironment for CargoDirectives {
    fn define(&mut self, name: &str) {
        if !self.defined.contains(name) {
            self.defined.define(name);
            self.lines.push(format!("cargo:rustc-cfg={name}"));
        }
    }
}

/// Value half of a `KEY=VALUE` line, with surrounding quotes and trailing
/// whitespace removed. `None` if the line has no `=`.
///
/// Only used for diagnostics: a flag is applied when its key is present,
/// whatever the value says.
pub fn env_value(line: &str) -> Option<&str> {
    let (_, value) = line.split_once('=')?;
    Some(value.trim_start_matches('"').trim_end().trim_end_matches('"'))
}

/// Runs [`translate_with`] over [`RECOGNIZED_FLAGS`].
pub fn translate(
    path: impl AsRef<Path>,
    env: &mut impl BuildEnvironment,
) -> anyhow::Result<Vec<&'static RecognizedFlag>> {
    translate_with(path, RECOGNIZED_FLAGS, env)
}

/// Registers the define of every flag in `flags` whose key starts a line of
/// the file at `path`. A missing file (or anything that is not a regular
/// file) means no overrides and is not an error.
///
/// Returns the flags that were applied, in table order.
pub fn translate_with<'f>(
    path: impl AsRef<Path>,
    flags: &'f [RecognizedFlag],
    env: &mut impl BuildEnvironment,
) -> anyhow::Result<Vec<&'f RecognizedFlag>> {
    let path = path.as_ref();
    if !path.is_file() {
        debug!("no env file at {}", path.display());
        return Ok(Vec::new());
    }

    info!("loading env file {}", path.display());
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let contents = String::from_utf8_lossy(&bytes);
    let lines = contents.lines().collect::<Vec<_>>();

    let mut applied = Vec::new();
    for flag in flags {
        let Some(line) = lines.iter().find(|line| flag.matches(line)) else {
            continue;
        };

        match env_value(line) {
            Some(value) => info!("{} ({}={:?})", flag.action, flag.key, value),
            None => info!("{} ({})", flag.action, flag.key),
        }
        env.define(flag.define);
        applied.push(flag);
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn env_file(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn defines(path: &Path) -> DefineSet {
        let mut set = DefineSet::new();
        translate(path, &mut set).unwrap();
        set
    }

    /// Counts every registration, so repeated defines show up.
    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl BuildEnvironment for Recorder {
        fn define(&mut self, name: &str) {
            self.0.push(name.to_owned());
        }
    }

    #[test]
    fn missing_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::default();

        let applied = translate(dir.path().join(".env"), &mut recorder).unwrap();

        assert!(applied.is_empty());
        assert!(recorder.0.is_empty());
    }

    #[test]
    fn directory_is_not_an_env_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".env")).unwrap();

        assert!(defines(&dir.path().join(".env")).is_empty());
    }

    #[test]
    fn swap_only() {
        let (_dir, path) = env_file("SWAP_XY_POSITION=true\n");
        let set = defines(&path);

        assert_eq!(set.iter().collect::<Vec<_>>(), ["SWAP_XY_POSITION"]);
    }

    #[test]
    fn value_does_not_gate_the_define() {
        let (_dir, path) =
            env_file("BUTTON_NORMAL_STATE_OPEN=\"true\"\nSWAP_XY_POSITION=\"false\"\n");
        let set = defines(&path);

        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            ["BUTTON_NORMAL_OPEN", "SWAP_XY_POSITION"]
        );
    }

    #[test]
    fn repeated_key_registers_once() {
        let (_dir, path) = env_file(
            "BUTTON_NORMAL_STATE_OPEN=1\nBUTTON_NORMAL_STATE_OPEN=0\nBUTTON_NORMAL_STATE_OPEN\n",
        );
        let mut recorder = Recorder::default();

        let applied = translate(&path, &mut recorder).unwrap();

        assert_eq!(recorder.0, ["BUTTON_NORMAL_OPEN"]);
        assert_eq!(applied, [&RECOGNIZED_FLAGS[0]]);
    }

    #[test]
    fn unrecognized_and_malformed_lines_are_ignored() {
        let (_dir, path) = env_file(concat!(
            "LIGHTS_PHYSICAL_ADDRESS=AA:BB\n",
            "# SWAP_XY_POSITION=true\n",
            "  SWAP_XY_POSITION=true\n",
            "garbage\n\n",
        ));

        assert!(defines(&path).is_empty());
    }

    #[test]
    fn matching_is_by_prefix_only() {
        // No `=` awareness when matching: a longer key sharing the prefix counts.
        let (_dir, path) = env_file("SWAP_XY_POSITION_LATER=no\n");

        assert!(defines(&path).contains("SWAP_XY_POSITION"));
    }

    #[test]
    fn crlf_and_invalid_utf8_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, b"NAME=\xff\xfe\r\nSWAP_XY_POSITION=true\r\n").unwrap();

        assert!(defines(&path).contains("SWAP_XY_POSITION"));
    }

    #[test]
    fn same_content_gives_same_defines() {
        let (_dir, path) = env_file("SWAP_XY_POSITION=1\nBUTTON_NORMAL_STATE_OPEN=1\n");

        assert_eq!(defines(&path), defines(&path));
    }

    #[test]
    fn custom_table() {
        const FLAGS: &[RecognizedFlag] = &[RecognizedFlag {
            key: "SWAP_XY_POSITION",
            define: "SWAP_XY_POSITION",
            action: "swapping x and y positions",
        }];
        let (_dir, path) = env_file("BUTTON_NORMAL_STATE_OPEN=1\nSWAP_XY_POSITION=1\n");
        let mut set = DefineSet::new();

        let applied = translate_with(&path, FLAGS, &mut set).unwrap();

        assert_eq!(applied.len(), 1);
        assert_eq!(set.iter().collect::<Vec<_>>(), ["SWAP_XY_POSITION"]);
    }

    #[test]
    fn cargo_directives_without_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut cargo = CargoDirectives::new(&path, RECOGNIZED_FLAGS);

        translate(&path, &mut cargo).unwrap();

        assert_eq!(
            cargo.lines(),
            [
                "cargo:rustc-check-cfg=cfg(BUTTON_NORMAL_OPEN)",
                "cargo:rustc-check-cfg=cfg(SWAP_XY_POSITION)",
            ]
        );
    }

    #[test]
    fn cargo_directives_with_env_file() {
        let (_dir, path) = env_file("SWAP_XY_POSITION=1\nSWAP_XY_POSITION=0\n");
        let mut cargo = CargoDirectives::new(&path, RECOGNIZED_FLAGS);

        for flag in translate(&path, &mut cargo).unwrap() {
            cargo.warn(flag);
        }

        assert_eq!(
            cargo.lines(),
            [
                format!("cargo:rerun-if-changed={}", path.display()),
                "cargo:rustc-check-cfg=cfg(BUTTON_NORMAL_OPEN)".to_owned(),
                "cargo:rustc-check-cfg=cfg(SWAP_XY_POSITION)".to_owned(),
                "cargo:rustc-cfg=SWAP_XY_POSITION".to_owned(),
                "cargo:warning=swapping x and y positions (SWAP_XY_POSITION)".to_owned(),
            ]
        );
    }

    #[test]
    fn cargo_define_is_emitted_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut cargo = CargoDirectives::new(&dir.path().join(".env"), &[]);

        cargo.define("SWAP_XY_POSITION");
        cargo.define("SWAP_XY_POSITION");

        assert_eq!(cargo.lines(), ["cargo:rustc-cfg=SWAP_XY_POSITION"]);
    }

    #[test]
    fn env_value_strips_quotes_and_whitespace() {
        assert_eq!(env_value("KEY=\"true\"  \n"), Some("true"));
        assert_eq!(env_value("KEY=false"), Some("false"));
        assert_eq!(env_value("KEY=a=b"), Some("a=b"));
        assert_eq!(env_value("KEY="), Some(""));
        assert_eq!(env_value("KEY"), None);
    }
}
