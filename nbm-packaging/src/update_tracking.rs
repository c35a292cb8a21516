// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Update tracking ledgers.

Every installed module has a ledger file under the `update_tracking/` directory of
its cluster recording the files each installed version owns:

```xml
<module codename="org.example.editor/1">
  <module_version specification_version="1.2" origin="nbm" last="true" install_time="1700000000000">
    <file name="modules/org-example-editor.jar" crc="3120587264"/>
  </module_version>
</module>
```

The `module_version` with `last="true"` is the currently installed version. Older
versions are retained as history.
*/

use {
    crate::{
        error::{NbmError, Result},
        io::{read_path, write_with_backup},
        module_identity::{ModuleIdentity, TrackingFileKind},
        spec_version::SpecificationVersion,
        xml_tree::{XmlDocument, XmlElement, XmlNode},
    },
    log::{debug, info, warn},
    nbm_file_manifest::{FileIntegrity, FileManifest, FileManifestEntry},
    std::{
        collections::{BTreeMap, BTreeSet},
        fmt::{Display, Formatter},
        path::{Path, PathBuf},
        str::FromStr,
    },
};

pub use nbm_file_manifest::crc_for_file;

/// Name of the directory holding ledgers inside a cluster.
pub const UPDATE_TRACKING_DIR: &str = "update_tracking";

/// How a module version was installed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Origin {
    /// Installed from a downloaded `.nbm` package.
    Nbm,
    /// Laid down by the product installer.
    Installer,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nbm => "nbm",
            Self::Installer => "installer",
        }
    }
}

impl FromStr for Origin {
    type Err = NbmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nbm" => Ok(Self::Nbm),
            "installer" => Ok(Self::Installer),
            _ => Err(NbmError::MalformedLedger(format!("unknown origin: {}", s))),
        }
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rules applied when mutating a ledger.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LedgerPolicy {
    /// A path occurs at most once per record, emptied history records are
    /// pruned and superseded records are marked `last="false"`.
    Strict,
    /// Reproduces ledgers as historically written: duplicate paths are kept
    /// with the last occurrence authoritative, emptied records are retained and
    /// superseded records keep their `last` flag.
    Legacy,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self::Strict
    }
}

/// A single installed version of a module and the files it owns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleVersionRecord {
    pub specification_version: SpecificationVersion,
    pub origin: Origin,
    pub install_time_millis: i64,
    pub last: bool,
    files: Vec<FileManifestEntry>,
}

impl ModuleVersionRecord {
    /// Construct a record installed now.
    pub fn new(specification_version: SpecificationVersion, origin: Origin) -> Self {
        Self {
            specification_version,
            origin,
            install_time_millis: chrono::Utc::now().timestamp_millis(),
            last: true,
            files: vec![],
        }
    }

    /// File entries in ledger order. Paths may repeat under [LedgerPolicy::Legacy].
    pub fn files(&self) -> &[FileManifestEntry] {
        &self.files
    }

    /// Whether the record owns no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The CRC recorded for a path. The last duplicate wins.
    pub fn file_crc(&self, path: &str) -> Option<u32> {
        self.files
            .iter()
            .rev()
            .find(|e| e.relative_path() == path)
            .map(|e| e.crc32())
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.iter().any(|e| e.relative_path() == path)
    }

    /// Collapse entries into a [FileManifest], resolving duplicates.
    pub fn file_manifest(&self) -> FileManifest {
        self.files.iter().cloned().collect()
    }

    fn push_file(&mut self, entry: FileManifestEntry, policy: LedgerPolicy) {
        if policy == LedgerPolicy::Strict {
            self.remove_file(entry.relative_path());
        }
        self.files.push(entry);
    }

    /// Remove all entries for a path. Returns whether anything was removed.
    pub fn remove_file(&mut self, path: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|e| e.relative_path() != path);
        self.files.len() != before
    }

    fn retain_files(&mut self, mut f: impl FnMut(&FileManifestEntry) -> bool) -> usize {
        let before = self.files.len();
        self.files.retain(|e| f(e));
        before - self.files.len()
    }

    fn from_element(element: &XmlElement, policy: LedgerPolicy) -> Result<Option<Self>> {
        let mut files = vec![];
        for child in element.child_elements() {
            if child.local_name() != "file" {
                continue;
            }

            let name = child.attribute("name").ok_or_else(|| {
                NbmError::MalformedLedger("file element missing name".to_string())
            })?;
            let crc = child.attribute("crc").ok_or_else(|| {
                NbmError::MalformedLedger(format!("file {} missing crc", name))
            })?;
            let crc = u32::from_str(crc).map_err(|_| {
                NbmError::MalformedLedger(format!("crc of {} is not a decimal integer: {}", name, crc))
            })?;

            files.push(FileManifestEntry::new(name, crc)?);
        }

        let specification_version = match element.attribute("specification_version") {
            Some(v) => SpecificationVersion::parse(v)
                .map_err(|e| NbmError::MalformedLedger(e.to_string()))?,
            None if files.is_empty() => {
                warn!("ignoring module_version without specification_version or files");
                return Ok(None);
            }
            None => {
                return Err(NbmError::MalformedLedger(
                    "module_version with files lacks specification_version".to_string(),
                ));
            }
        };

        let origin = Origin::from_str(element.attribute("origin").ok_or_else(|| {
            NbmError::MalformedLedger("module_version missing origin".to_string())
        })?)?;

        let install_time_millis = match element.attribute("install_time") {
            Some(v) => i64::from_str(v).map_err(|_| {
                NbmError::MalformedLedger(format!(
                    "install_time is not a decimal integer: {}",
                    v
                ))
            })?,
            None => 0,
        };

        let last = element.attribute("last") == Some("true");

        let mut record = Self {
            specification_version,
            origin,
            install_time_millis,
            last,
            files: vec![],
        };
        for entry in files {
            record.push_file(entry, policy);
        }

        Ok(Some(record))
    }

    fn to_element(&self) -> XmlElement {
        let mut element = XmlElement::new("module_version")
            .with_attribute("specification_version", &self.specification_version)
            .with_attribute("origin", self.origin)
            .with_attribute("last", self.last)
            .with_attribute("install_time", self.install_time_millis);

        for entry in &self.files {
            element.children.push(XmlNode::Element(
                XmlElement::new("file")
                    .with_attribute("name", entry.relative_path())
                    .with_attribute("crc", entry.crc32()),
            ));
        }

        element
    }
}

/// Whether a tracked path belongs to a locale.
///
/// Matches `_<locale>.` and `_<locale>/` anywhere in the path and a trailing `_<locale>`.
pub fn is_localized_path(path: &str, locale: &str) -> bool {
    let marker = format!("_{}", locale);

    path.contains(&format!("{}.", marker))
        || path.contains(&format!("{}/", marker))
        || path.ends_with(&marker)
}

/// The ledger of a single module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleTracking {
    codename: ModuleIdentity,
    current: Option<ModuleVersionRecord>,
    history: Vec<ModuleVersionRecord>,
    /// Number of history records preceding the current record in the ledger.
    current_position: usize,
    policy: LedgerPolicy,
}

impl ModuleTracking {
    /// Construct an empty ledger.
    pub fn new(codename: ModuleIdentity, policy: LedgerPolicy) -> Self {
        Self {
            codename,
            current: None,
            history: vec![],
            current_position: 0,
            policy,
        }
    }

    pub fn codename(&self) -> &ModuleIdentity {
        &self.codename
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    /// The currently installed version.
    pub fn current(&self) -> Option<&ModuleVersionRecord> {
        self.current.as_ref()
    }

    /// Superseded versions in ledger order.
    pub fn history(&self) -> &[ModuleVersionRecord] {
        &self.history
    }

    /// Iterate over all records in ledger order.
    pub fn records(&self) -> impl Iterator<Item = &ModuleVersionRecord> {
        let (before, after) = self.history.split_at(self.current_position);

        before.iter().chain(self.current.iter()).chain(after.iter())
    }

    fn records_mut(&mut self) -> impl Iterator<Item = &mut ModuleVersionRecord> {
        let (before, after) = self.history.split_at_mut(self.current_position);

        before
            .iter_mut()
            .chain(self.current.iter_mut())
            .chain(after.iter_mut())
    }

    /// Record the installation of a new version, which becomes current.
    pub fn add_new_version(
        &mut self,
        specification_version: SpecificationVersion,
        origin: Origin,
    ) -> &mut ModuleVersionRecord {
        if let Some(mut previous) = self.current.take() {
            if self.policy == LedgerPolicy::Strict {
                previous.last = false;
            }
            self.history.insert(self.current_position, previous);
        }
        self.current_position = self.history.len();

        self.current
            .insert(ModuleVersionRecord::new(specification_version, origin))
    }

    /// Add a file to the current version.
    ///
    /// The path is removed from superseded versions of this module.
    pub fn add_file(&mut self, path: &str, crc: u32) -> Result<()> {
        let entry = FileManifestEntry::new(path, crc)?;
        let policy = self.policy;

        let current = self.current.as_mut().ok_or_else(|| {
            NbmError::MalformedLedger(format!("{} has no current version", self.codename))
        })?;
        current.push_file(entry.clone(), policy);

        for record in self.history.iter_mut() {
            record.remove_file(entry.relative_path());
        }
        self.prune_history();

        Ok(())
    }

    /// Remove a path from every record. Returns whether anything was removed.
    pub fn remove_file(&mut self, path: &str) -> bool {
        let mut removed = false;
        for record in self.records_mut() {
            removed |= record.remove_file(path);
        }
        if removed {
            self.prune_history();
        }

        removed
    }

    /// Whether any record owns a path.
    pub fn owns(&self, path: &str) -> bool {
        self.records().any(|r| r.has_file(path))
    }

    /// Drop entries belonging to a locale. Returns the number of entries removed.
    pub fn remove_localized(&mut self, locale: &str) -> usize {
        let removed: usize = self
            .records_mut()
            .map(|r| r.retain_files(|e| !is_localized_path(e.relative_path(), locale)))
            .sum();

        if removed > 0 {
            self.prune_history();
        }

        removed
    }

    fn prune_history(&mut self) {
        if self.policy == LedgerPolicy::Strict {
            let position = self.current_position;
            let mut index = 0;
            let mut removed_before = 0;

            self.history.retain(|r| {
                let keep = !r.is_empty();
                if !keep && index < position {
                    removed_before += 1;
                }
                index += 1;
                keep
            });

            self.current_position -= removed_before;
        }
    }

    /// Parse a ledger from XML bytes.
    pub fn parse(data: &[u8], policy: LedgerPolicy) -> Result<Self> {
        let doc = XmlDocument::parse(data)?;

        if doc.root.local_name() != "module" {
            return Err(NbmError::MalformedLedger(format!(
                "root element is {}, expected module",
                doc.root.local_name()
            )));
        }

        let codename = doc.root.attribute("codename").ok_or_else(|| {
            NbmError::MalformedLedger("module element missing codename".to_string())
        })?;
        let codename = ModuleIdentity::parse(codename)
            .map_err(|e| NbmError::MalformedLedger(e.to_string()))?;

        let mut tracking = Self::new(codename, policy);

        for element in doc.root.child_elements() {
            if element.local_name() != "module_version" {
                continue;
            }

            if let Some(record) = ModuleVersionRecord::from_element(element, policy)? {
                tracking.history.push(record);
            }
        }

        // The last record marked as last is current. It keeps its place.
        match tracking.history.iter().rposition(|r| r.last) {
            Some(index) => {
                tracking.current = Some(tracking.history.remove(index));
                tracking.current_position = index;
            }
            None => {
                tracking.current_position = tracking.history.len();
            }
        }

        Ok(tracking)
    }

    /// Read a ledger file.
    pub fn from_path(path: impl AsRef<Path>, policy: LedgerPolicy) -> Result<Self> {
        Self::parse(&read_path(path.as_ref())?, policy)
    }

    /// Serialize to XML bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut root = XmlElement::new("module").with_attribute("codename", &self.codename);

        for record in self.records() {
            root.children.push(XmlNode::Element(record.to_element()));
        }

        XmlDocument::new(root).to_bytes(true)
    }

    /// Write the ledger to a file.
    ///
    /// The document is serialized before the file is touched. The previous content
    /// is restored if writing fails.
    pub fn write_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self.to_bytes()?;
        write_with_backup(path.as_ref(), &data)
    }
}

/// Outcome of removing localized entries from a tracking directory.
#[derive(Debug, Default)]
pub struct LocaleStripReport {
    /// Ledger files that were rewritten.
    pub rewritten: Vec<PathBuf>,
    /// Number of entries removed.
    pub removed_entries: usize,
    /// Ledger files that could not be processed.
    pub failures: Vec<(PathBuf, NbmError)>,
}

impl LocaleStripReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A tracked file whose state differs from its ledger.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrackedFileProblem {
    pub codename: String,
    pub path: String,
    pub integrity: FileIntegrity,
}

impl Display for TrackedFileProblem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.integrity {
            FileIntegrity::Missing => write!(f, "{}: {} is missing", self.codename, self.path),
            FileIntegrity::Modified { actual } => write!(
                f,
                "{}: {} has been modified (crc {})",
                self.codename, self.path, actual
            ),
            FileIntegrity::Intact => write!(f, "{}: {} is intact", self.codename, self.path),
        }
    }
}

/// All ledgers of a cluster's `update_tracking` directory.
#[derive(Clone, Debug)]
pub struct TrackingDirectory {
    path: PathBuf,
    policy: LedgerPolicy,
    modules: BTreeMap<String, ModuleTracking>,
    dirty: BTreeSet<String>,
}

fn ledger_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = vec![];

    for entry in std::fs::read_dir(dir).map_err(|e| NbmError::IoPath(dir.display().to_string(), e))? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == "xml").unwrap_or(false) {
            paths.push(path);
        }
    }

    paths.sort();

    Ok(paths)
}

impl TrackingDirectory {
    /// An empty directory rooted at `path`.
    pub fn new(path: impl AsRef<Path>, policy: LedgerPolicy) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            policy,
            modules: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Load every `*.xml` ledger of a directory.
    ///
    /// A missing directory is treated as empty.
    pub fn load(path: impl AsRef<Path>, policy: LedgerPolicy) -> Result<Self> {
        let mut res = Self::new(path, policy);

        if !res.path.is_dir() {
            debug!("{} does not exist; no modules tracked", res.path.display());
            return Ok(res);
        }

        for path in ledger_paths(&res.path)? {
            debug!("reading ledger {}", path.display());
            let tracking = ModuleTracking::from_path(&path, policy)?;
            let cnb = tracking.codename().code_name_base().to_string();

            if res.modules.insert(cnb.clone(), tracking).is_some() {
                warn!("{} is tracked by more than 1 ledger; using {}", cnb, path.display());
            }
        }

        Ok(res)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Obtain the ledger of a module by code name base.
    pub fn get(&self, code_name_base: &str) -> Option<&ModuleTracking> {
        self.modules.get(code_name_base)
    }

    /// Iterate over ledgers in code name base order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleTracking> {
        self.modules.values()
    }

    /// The ledger file of a module.
    pub fn ledger_path(&self, identity: &ModuleIdentity) -> PathBuf {
        self.path
            .join(identity.to_file_name(TrackingFileKind::Ledger))
    }

    /// The code name base of the module owning a path, if any.
    pub fn owner_of(&self, path: &str) -> Option<&str> {
        self.modules
            .values()
            .find(|m| m.current().map(|r| r.has_file(path)).unwrap_or(false))
            .or_else(|| self.modules.values().find(|m| m.owns(path)))
            .map(|m| m.codename().code_name_base())
    }

    /// Record a newly installed version of a module.
    pub fn add_module_version(
        &mut self,
        identity: &ModuleIdentity,
        specification_version: SpecificationVersion,
        origin: Origin,
    ) {
        let cnb = identity.code_name_base().to_string();
        let policy = self.policy;

        self.modules
            .entry(cnb.clone())
            .or_insert_with(|| ModuleTracking::new(identity.clone(), policy))
            .add_new_version(specification_version, origin);
        self.dirty.insert(cnb);
    }

    /// Record a file installed by the current version of a module.
    ///
    /// Ownership of the path is taken from any other module.
    pub fn install_file(&mut self, code_name_base: &str, path: &str, crc: u32) -> Result<()> {
        if !self.modules.contains_key(code_name_base) {
            return Err(NbmError::MalformedLedger(format!(
                "{} is not tracked",
                code_name_base
            )));
        }

        for (cnb, tracking) in self.modules.iter_mut() {
            if cnb != code_name_base && tracking.remove_file(path) {
                info!("{} moves from {} to {}", path, cnb, code_name_base);
                self.dirty.insert(cnb.clone());
            }
        }

        if let Some(tracking) = self.modules.get_mut(code_name_base) {
            tracking.add_file(path, crc)?;
        }
        self.dirty.insert(code_name_base.to_string());

        Ok(())
    }

    /// Write ledgers modified since loading. Returns the written paths.
    pub fn write_changed(&mut self) -> Result<Vec<PathBuf>> {
        let mut written = vec![];

        if !self.dirty.is_empty() {
            std::fs::create_dir_all(&self.path)
                .map_err(|e| NbmError::IoPath(self.path.display().to_string(), e))?;
        }

        for cnb in std::mem::take(&mut self.dirty) {
            if let Some(tracking) = self.modules.get(&cnb) {
                let path = self.ledger_path(tracking.codename());
                debug!("writing {}", path.display());
                tracking.write_path(&path)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Compare files of current versions against a cluster directory.
    ///
    /// Only files that are missing or modified are reported.
    pub fn verify_files(&self, cluster_root: impl AsRef<Path>) -> Result<Vec<TrackedFileProblem>> {
        let cluster_root = cluster_root.as_ref();
        let mut problems = vec![];

        for tracking in self.modules.values() {
            let record = match tracking.current() {
                Some(record) => record,
                None => continue,
            };

            for entry in record.file_manifest().iter_entries() {
                let integrity = entry.check_integrity(cluster_root)?;
                if integrity != FileIntegrity::Intact {
                    problems.push(TrackedFileProblem {
                        codename: tracking.codename().code_name_base().to_string(),
                        path: entry.relative_path().to_string(),
                        integrity,
                    });
                }
            }
        }

        Ok(problems)
    }
}

/// Remove entries of a locale from every ledger in a directory.
///
/// Each ledger is processed independently. A ledger that cannot be read or
/// written is reported and the remaining ledgers are still processed.
pub fn remove_localized(
    dir: impl AsRef<Path>,
    locale: &str,
    policy: LedgerPolicy,
) -> Result<LocaleStripReport> {
    let mut report = LocaleStripReport::default();

    for path in ledger_paths(dir.as_ref())? {
        let res = ModuleTracking::from_path(&path, policy).and_then(|mut tracking| {
            let removed = tracking.remove_localized(locale);
            if removed > 0 {
                tracking.write_path(&path)?;
            }
            Ok(removed)
        });

        match res {
            Ok(0) => {}
            Ok(removed) => {
                info!("removed {} {} entries from {}", removed, locale, path.display());
                report.removed_entries += removed;
                report.rewritten.push(path);
            }
            Err(e) => {
                warn!("failed to process {}: {}", path.display(), e);
                report.failures.push((path, e));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    const LEDGER: &str = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <module codename="org.example.editor/1">
          <module_version specification_version="1.0" origin="installer" last="false" install_time="1000">
            <file name="modules/org-example-editor.jar" crc="1"/>
            <file name="config/old.xml" crc="2"/>
          </module_version>
          <module_version specification_version="1.2" origin="nbm" last="true" install_time="2000">
            <file name="modules/org-example-editor.jar" crc="3"/>
            <file name="modules/locale/org-example-editor_ja.jar" crc="4"/>
          </module_version>
        </module>
    "#};

    #[test]
    fn parse_ledger() -> Result<()> {
        let t = ModuleTracking::parse(LEDGER.as_bytes(), LedgerPolicy::Strict)?;

        assert_eq!(t.codename().to_string(), "org.example.editor/1");
        let current = t.current().unwrap();
        assert_eq!(current.specification_version.to_string(), "1.2");
        assert_eq!(current.origin, Origin::Nbm);
        assert_eq!(current.install_time_millis, 2000);
        assert!(current.last);
        assert_eq!(current.file_crc("modules/org-example-editor.jar"), Some(3));
        assert_eq!(t.history().len(), 1);
        assert_eq!(t.history()[0].origin, Origin::Installer);

        Ok(())
    }

    #[test]
    fn round_trip() -> Result<()> {
        let t = ModuleTracking::parse(LEDGER.as_bytes(), LedgerPolicy::Strict)?;
        let written = t.to_bytes()?;

        assert_eq!(ModuleTracking::parse(&written, LedgerPolicy::Strict)?, t);

        let s = String::from_utf8_lossy(&written);
        assert!(s.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<module codename=\"org.example.editor/1\">"));
        assert!(s.contains(r#"<file name="config/old.xml" crc="2"/>"#));

        Ok(())
    }

    #[test]
    fn legacy_round_trip_keeps_record_order() -> Result<()> {
        let ledger = indoc! {r#"
            <?xml version="1.0" encoding="UTF-8"?>
            <module codename="org.example.editor/1">
              <module_version specification_version="2.0" origin="nbm" last="true" install_time="2000">
                <file name="modules/org-example-editor.jar" crc="3"/>
              </module_version>
              <module_version specification_version="1.0" origin="installer" last="false" install_time="1000">
                <file name="config/old.xml" crc="2"/>
              </module_version>
            </module>
        "#};

        let t = ModuleTracking::parse(ledger.as_bytes(), LedgerPolicy::Legacy)?;
        assert_eq!(t.current().unwrap().specification_version.to_string(), "2.0");
        assert_eq!(
            t.records()
                .map(|r| r.specification_version.to_string())
                .collect::<Vec<_>>(),
            vec!["2.0", "1.0"]
        );
        assert_eq!(String::from_utf8_lossy(&t.to_bytes()?), ledger);

        // A new version goes last; the superseded one keeps its place.
        let mut t = t;
        t.add_new_version(SpecificationVersion::parse("3.0")?, Origin::Nbm);
        assert_eq!(
            t.records()
                .map(|r| r.specification_version.to_string())
                .collect::<Vec<_>>(),
            vec!["2.0", "1.0", "3.0"]
        );

        Ok(())
    }

    #[test]
    fn pruning_keeps_current_in_place() -> Result<()> {
        let ledger = indoc! {r#"
            <module codename="a">
              <module_version specification_version="1.0" origin="nbm" last="false">
                <file name="x_ja.txt" crc="1"/>
              </module_version>
              <module_version specification_version="2.0" origin="nbm" last="true">
                <file name="y.txt" crc="2"/>
              </module_version>
              <module_version specification_version="1.5" origin="nbm" last="false">
                <file name="z.txt" crc="3"/>
              </module_version>
            </module>
        "#};

        let mut t = ModuleTracking::parse(ledger.as_bytes(), LedgerPolicy::Strict)?;
        assert_eq!(t.remove_localized("ja"), 1);
        assert_eq!(
            t.records()
                .map(|r| r.specification_version.to_string())
                .collect::<Vec<_>>(),
            vec!["2.0", "1.5"]
        );

        Ok(())
    }

    #[test]
    fn malformed_ledgers() {
        for (data, what) in [
            (r#"<modules codename="a"/>"#, "wrong root"),
            (r#"<module/>"#, "missing codename"),
            (r#"<module codename="a/x"/>"#, "bad codename"),
            (
                r#"<module codename="a"><module_version origin="nbm" last="true"><file name="x" crc="1"/></module_version></module>"#,
                "files without version",
            ),
            (
                r#"<module codename="a"><module_version specification_version="1" origin="web"/></module>"#,
                "unknown origin",
            ),
            (
                r#"<module codename="a"><module_version specification_version="1" origin="nbm"><file name="x" crc="0x1"/></module_version></module>"#,
                "hex crc",
            ),
            (
                r#"<module codename="a"><module_version specification_version="1" origin="nbm" install_time="soon"/></module>"#,
                "bad install time",
            ),
        ] {
            assert!(
                matches!(
                    ModuleTracking::parse(data.as_bytes(), LedgerPolicy::Strict),
                    Err(NbmError::MalformedLedger(_))
                ),
                "{}",
                what
            );
        }
    }

    #[test]
    fn empty_module_version_skipped() -> Result<()> {
        let t = ModuleTracking::parse(
            br#"<module codename="a"><module_version origin="nbm" last="true"/></module>"#,
            LedgerPolicy::Strict,
        )?;
        assert!(t.current().is_none());
        assert!(t.history().is_empty());

        Ok(())
    }

    #[test]
    fn duplicate_paths() -> Result<()> {
        let data = br#"<module codename="a"><module_version specification_version="1" origin="nbm" last="true"><file name="x" crc="1"/><file name="x" crc="2"/></module_version></module>"#;

        let strict = ModuleTracking::parse(data, LedgerPolicy::Strict)?;
        assert_eq!(strict.current().unwrap().files().len(), 1);
        assert_eq!(strict.current().unwrap().file_crc("x"), Some(2));

        let legacy = ModuleTracking::parse(data, LedgerPolicy::Legacy)?;
        assert_eq!(legacy.current().unwrap().files().len(), 2);
        assert_eq!(legacy.current().unwrap().file_crc("x"), Some(2));
        assert_eq!(legacy.current().unwrap().file_manifest().crc("x"), Some(2));

        Ok(())
    }

    #[test]
    fn new_version_supersedes() -> Result<()> {
        let mut strict = ModuleTracking::parse(LEDGER.as_bytes(), LedgerPolicy::Strict)?;
        strict.add_new_version(SpecificationVersion::parse("1.3")?, Origin::Nbm);
        strict.add_file("modules/org-example-editor.jar", 5)?;

        assert_eq!(strict.current().unwrap().specification_version.to_string(), "1.3");
        assert!(strict.current().unwrap().last);
        assert!(strict.history().iter().all(|r| !r.last));
        assert!(strict
            .history()
            .iter()
            .all(|r| !r.has_file("modules/org-example-editor.jar")));
        assert!(strict.owns("config/old.xml"));

        let mut legacy = ModuleTracking::parse(LEDGER.as_bytes(), LedgerPolicy::Legacy)?;
        legacy.add_new_version(SpecificationVersion::parse("1.3")?, Origin::Nbm);
        assert!(legacy.history()[1].last);

        Ok(())
    }

    #[test]
    fn add_file_requires_current() -> Result<()> {
        let mut t = ModuleTracking::new(ModuleIdentity::parse("a")?, LedgerPolicy::Strict);
        assert!(t.add_file("x", 1).is_err());

        Ok(())
    }

    #[test]
    fn localized_paths() {
        assert!(is_localized_path("a_ja.properties", "ja"));
        assert!(is_localized_path("c_ja/x.txt", "ja"));
        assert!(is_localized_path("docs/help_ja", "ja"));
        assert!(!is_localized_path("b.properties", "ja"));
        assert!(!is_localized_path("java/x.jar", "ja"));
    }

    #[test]
    fn remove_localized_entries() -> Result<()> {
        let data = br#"<module codename="a">
  <module_version specification_version="1" origin="nbm" last="false">
    <file name="x_ja.jar" crc="9"/>
  </module_version>
  <module_version specification_version="2" origin="nbm" last="true">
    <file name="a_ja.properties" crc="1"/>
    <file name="b.properties" crc="2"/>
    <file name="c_ja/x.txt" crc="3"/>
  </module_version>
</module>"#;

        let mut strict = ModuleTracking::parse(data, LedgerPolicy::Strict)?;
        assert_eq!(strict.remove_localized("ja"), 3);
        let paths = strict
            .current()
            .unwrap()
            .files()
            .iter()
            .map(|e| e.relative_path())
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["b.properties"]);
        assert!(strict.history().is_empty());

        let mut legacy = ModuleTracking::parse(data, LedgerPolicy::Legacy)?;
        assert_eq!(legacy.remove_localized("ja"), 3);
        assert_eq!(legacy.history().len(), 1);
        assert!(legacy.history()[0].is_empty());

        Ok(())
    }

    #[test]
    fn directory_operations() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let dir = td.path().join(UPDATE_TRACKING_DIR);

        let mut tracking = TrackingDirectory::load(&dir, LedgerPolicy::Strict)?;
        let a = ModuleIdentity::parse("org.a")?;
        let b = ModuleIdentity::parse("org.b/2")?;
        tracking.add_module_version(&a, SpecificationVersion::parse("1.0")?, Origin::Installer);
        tracking.add_module_version(&b, SpecificationVersion::parse("2.1")?, Origin::Nbm);

        std::fs::create_dir_all(td.path().join("modules"))?;
        std::fs::write(td.path().join("modules/shared.jar"), b"123456789")?;
        let crc = crc_for_file(td.path().join("modules/shared.jar"))?;

        tracking.install_file("org.a", "modules/shared.jar", crc)?;
        assert_eq!(tracking.owner_of("modules/shared.jar"), Some("org.a"));
        tracking.install_file("org.b", "modules/shared.jar", crc)?;
        assert_eq!(tracking.owner_of("modules/shared.jar"), Some("org.b"));
        assert!(!tracking.get("org.a").unwrap().owns("modules/shared.jar"));
        tracking.install_file("org.b", "modules/gone.jar", 7)?;

        let written = tracking.write_changed()?;
        assert_eq!(written.len(), 2);
        assert!(dir.join("org-b.xml").exists());
        assert!(tracking.write_changed()?.is_empty());

        let reloaded = TrackingDirectory::load(&dir, LedgerPolicy::Strict)?;
        assert_eq!(reloaded.iter().count(), 2);
        assert_eq!(reloaded.owner_of("modules/shared.jar"), Some("org.b"));

        let problems = reloaded.verify_files(td.path())?;
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].path, "modules/gone.jar");
        assert_eq!(problems[0].integrity, FileIntegrity::Missing);

        std::fs::write(td.path().join("modules/shared.jar"), b"changed")?;
        let problems = reloaded.verify_files(td.path())?;
        assert_eq!(problems.len(), 2);

        Ok(())
    }

    #[test]
    fn remove_localized_directory() -> Result<()> {
        let td = tempfile::TempDir::new()?;

        std::fs::write(
            td.path().join("org-a.xml"),
            br#"<module codename="org.a"><module_version specification_version="1" origin="nbm" last="true"><file name="a_ja.properties" crc="1"/><file name="b.properties" crc="2"/></module_version></module>"#,
        )?;
        std::fs::write(
            td.path().join("org-b.xml"),
            br#"<module codename="org.b"><module_version specification_version="1" origin="nbm" last="true"><file name="b.properties" crc="2"/></module_version></module>"#,
        )?;
        std::fs::write(td.path().join("org-c.xml"), b"<not-a-ledger/>")?;

        let report = remove_localized(td.path(), "ja", LedgerPolicy::Strict)?;
        assert_eq!(report.removed_entries, 1);
        assert_eq!(report.rewritten, vec![td.path().join("org-a.xml")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, td.path().join("org-c.xml"));
        assert!(!report.is_success());

        let a = ModuleTracking::from_path(td.path().join("org-a.xml"), LedgerPolicy::Strict)?;
        assert!(!a.owns("a_ja.properties"));
        assert!(a.owns("b.properties"));

        Ok(())
    }
}
