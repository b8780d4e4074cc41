//! Git references
//!
//! References are human-readable names pointing to commits. They are either
//! direct (a 40-character SHA-1) or symbolic (`ref: <name>`, as `HEAD` is).
//!
//! ## Layout
//!
//! - `HEAD`: symbolic ref to the default branch
//! - `refs/heads/<branch>`: loose branch refs
//! - `packed-refs`: flat `<oid> <name>` snapshot consulted when no loose file
//!   exists

use crate::areas::storage::{FileSystem, join, list_files, parent};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use bytes::Bytes;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: (.+)$";

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

pub const REFS_DIR: &str = "refs";

pub const HEADS_DIR: &str = "refs/heads";

pub const PACKED_REFS: &str = "packed-refs";

const PACKED_REFS_HEADER: &str = "# pack-refs with: peeled fully-peeled sorted";

/// Parsed content of a ref file
#[derive(Debug, Clone, PartialEq)]
enum SymRefOrOid {
    SymRef { target: String },
    Oid(ObjectId),
}

impl SymRefOrOid {
    fn parse(name: &str, content: &str) -> Result<Option<Self>> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let symref_match = Regex::new(SYMREF_REGEX)
            .map_err(anyhow::Error::from)?
            .captures(content);
        if let Some(symref_match) = symref_match {
            return Ok(Some(SymRefOrOid::SymRef {
                target: symref_match[1].to_string(),
            }));
        }

        ObjectId::try_parse(content.to_string())
            .map(|oid| Some(SymRefOrOid::Oid(oid)))
            .map_err(|_| Error::VaultReferenceInvalid {
                reference: name.to_string(),
            })
    }
}

/// Reads and writes the references of one repository
#[derive(Debug, Clone)]
pub struct Refs {
    fs: Arc<dyn FileSystem>,
    /// Path of the git directory
    path: String,
}

impl Refs {
    pub fn new(fs: Arc<dyn FileSystem>, path: &str) -> Self {
        Refs {
            fs,
            path: path.to_string(),
        }
    }

    fn ref_path(&self, name: &str) -> String {
        join(&self.path, name)
    }

    async fn read_loose(&self, name: &str) -> Result<Option<SymRefOrOid>> {
        let path = self.ref_path(name);
        if !self.fs.exists(&path).await? || self.fs.is_dir(&path).await? {
            return Ok(None);
        }

        let content = self.fs.read(&path).await?;
        SymRefOrOid::parse(name, &String::from_utf8_lossy(&content))
    }

    /// Look a name up as `<name>`, `refs/<name>`, `refs/heads/<name>`, then in
    /// packed-refs under the same candidates
    async fn read_ref(&self, name: &str) -> Result<Option<SymRefOrOid>> {
        let candidates = [
            name.to_string(),
            join(REFS_DIR, name),
            join(HEADS_DIR, name),
        ];

        for candidate in &candidates {
            if let Some(value) = self.read_loose(candidate).await? {
                return Ok(Some(value));
            }
        }

        let packed = self.packed_refs().await?;
        Ok(candidates
            .iter()
            .find_map(|candidate| packed.get(candidate).cloned())
            .map(SymRefOrOid::Oid))
    }

    /// Resolve a reference or oid to an oid, following at most `max_depth`
    /// symbolic hops
    pub async fn resolve(&self, reference: &str, max_depth: usize) -> Result<ObjectId> {
        if ObjectId::is_oid(reference) {
            return Ok(ObjectId::try_parse(reference.to_string())?);
        }

        let mut current = reference.to_string();
        for _ in 0..=max_depth {
            match self.read_ref(&current).await? {
                Some(SymRefOrOid::Oid(oid)) => return Ok(oid),
                Some(SymRefOrOid::SymRef { target }) => current = target,
                None => {
                    return Err(Error::VaultReferenceInvalid {
                        reference: reference.to_string(),
                    });
                }
            }
        }

        Err(Error::ReferenceResolutionDepthExceeded {
            reference: reference.to_string(),
        })
    }

    pub async fn resolve_head(&self, max_depth: usize) -> Result<ObjectId> {
        self.resolve(HEAD_REF_NAME, max_depth).await
    }

    /// The direct ref at the end of HEAD's symbolic chain, e.g. `refs/heads/master`
    pub async fn current_ref(&self, max_depth: usize) -> Result<String> {
        let mut current = HEAD_REF_NAME.to_string();
        for _ in 0..=max_depth {
            match self.read_loose(&current).await? {
                Some(SymRefOrOid::SymRef { target }) => current = target,
                Some(SymRefOrOid::Oid(_)) | None => return Ok(current),
            }
        }

        Err(Error::ReferenceResolutionDepthExceeded {
            reference: HEAD_REF_NAME.to_string(),
        })
    }

    /// Where HEAD points, if it is symbolic
    pub async fn head_target(&self) -> Result<Option<String>> {
        match self.read_loose(HEAD_REF_NAME).await? {
            Some(SymRefOrOid::SymRef { target }) => Ok(Some(target)),
            _ => Ok(None),
        }
    }

    /// Advance the branch HEAD points at
    pub async fn update_head(&self, oid: &ObjectId, max_depth: usize) -> Result<()> {
        let current_ref = self.current_ref(max_depth).await?;
        self.update_ref(&current_ref, oid).await
    }

    pub async fn update_ref(&self, name: &str, oid: &ObjectId) -> Result<()> {
        self.write_ref_file(name, format!("{oid}\n")).await?;
        debug!(reference = name, oid = %oid, "updated ref");
        Ok(())
    }

    pub async fn set_symbolic(&self, name: &str, target: &str) -> Result<()> {
        self.write_ref_file(name, format!("ref: {target}\n")).await
    }

    async fn write_ref_file(&self, name: &str, content: String) -> Result<()> {
        let path = self.ref_path(name);
        self.fs.mkdir(parent(&path), true).await?;

        let temp_path = format!("{path}.lock");
        self.fs.write(&temp_path, Bytes::from(content)).await?;
        self.fs.rename(&temp_path, &path).await
    }

    /// Ref names under `prefix`, loose and packed, sorted and deduplicated
    pub async fn list_refs(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();

        let dir = self.ref_path(prefix);
        if self.fs.is_dir(&dir).await? {
            for file in list_files(self.fs.as_ref(), &dir).await? {
                if !file.ends_with(".lock") {
                    names.insert(join(prefix, &file));
                }
            }
        } else if self.fs.exists(&dir).await? {
            names.insert(prefix.to_string());
        }

        names.extend(
            self.packed_refs()
                .await?
                .into_keys()
                .filter(|name| name == prefix || name.starts_with(&format!("{prefix}/"))),
        );

        Ok(names.into_iter().collect())
    }

    pub async fn packed_refs(&self) -> Result<BTreeMap<String, ObjectId>> {
        let path = self.ref_path(PACKED_REFS);
        if !self.fs.exists(&path).await? {
            return Ok(BTreeMap::new());
        }

        let content = self.fs.read(&path).await?;
        parse_packed_refs(&String::from_utf8_lossy(&content))
    }

    pub async fn write_packed_refs(&self, refs: &BTreeMap<String, ObjectId>) -> Result<()> {
        let mut content = format!("{PACKED_REFS_HEADER}\n");
        for (name, oid) in refs {
            content.push_str(&format!("{oid} {name}\n"));
        }

        self.write_ref_file(PACKED_REFS, content).await
    }

    /// Move every loose direct ref under `refs/` into packed-refs
    pub async fn pack_refs(&self) -> Result<()> {
        let mut packed = self.packed_refs().await?;
        let mut loose = Vec::new();

        for name in self.list_refs(REFS_DIR).await? {
            if let Some(SymRefOrOid::Oid(oid)) = self.read_loose(&name).await? {
                packed.insert(name.clone(), oid);
                loose.push(name);
            }
        }

        self.write_packed_refs(&packed).await?;
        for name in loose {
            self.fs.unlink(&self.ref_path(&name)).await?;
        }

        Ok(())
    }

    /// Refs in advertisement order: HEAD first, then everything under `refs/`
    pub async fn advertised_refs(&self, max_depth: usize) -> Result<Vec<(String, ObjectId)>> {
        let mut advertised = Vec::new();

        match self.resolve_head(max_depth).await {
            Ok(oid) => advertised.push((HEAD_REF_NAME.to_string(), oid)),
            Err(Error::VaultReferenceInvalid { .. }) => {}
            Err(err) => return Err(err),
        }

        for name in self.list_refs(REFS_DIR).await? {
            let oid = self.resolve(&name, max_depth).await?;
            advertised.push((name, oid));
        }

        Ok(advertised)
    }
}

fn parse_packed_refs(content: &str) -> Result<BTreeMap<String, ObjectId>> {
    let mut refs = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        // comments, blanks and peeled tag lines
        if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
            continue;
        }

        let (oid, name) = line
            .split_once(' ')
            .ok_or_else(|| anyhow::anyhow!("malformed packed-refs line {line:?}"))?;
        refs.insert(name.to_string(), ObjectId::try_parse(oid.to_string())?);
    }

    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::storage::MemoryFs;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    const OID_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const OID_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn oid(raw: &str) -> ObjectId {
        ObjectId::try_parse(raw.to_string()).unwrap()
    }

    #[fixture]
    fn refs() -> Refs {
        Refs::new(Arc::new(MemoryFs::new()), ".git")
    }

    #[rstest]
    #[tokio::test]
    async fn oids_resolve_to_themselves(refs: Refs) {
        assert_eq!(refs.resolve(OID_A, 0).await.unwrap(), oid(OID_A));
    }

    #[rstest]
    #[tokio::test]
    async fn head_follows_the_branch(refs: Refs) {
        refs.set_symbolic(HEAD_REF_NAME, "refs/heads/master").await.unwrap();
        refs.update_ref("refs/heads/master", &oid(OID_A)).await.unwrap();

        assert_eq!(refs.resolve_head(1).await.unwrap(), oid(OID_A));
        assert_eq!(refs.resolve("master", 1).await.unwrap(), oid(OID_A));
        assert_eq!(refs.current_ref(1).await.unwrap(), "refs/heads/master");

        refs.update_head(&oid(OID_B), 1).await.unwrap();
        assert_eq!(refs.resolve("refs/heads/master", 1).await.unwrap(), oid(OID_B));
    }

    #[rstest]
    #[tokio::test]
    async fn cyclic_symrefs_exhaust_the_depth(refs: Refs) {
        refs.set_symbolic("refs/heads/a", "refs/heads/b").await.unwrap();
        refs.set_symbolic("refs/heads/b", "refs/heads/a").await.unwrap();

        let err = refs.resolve("refs/heads/a", 10).await.unwrap_err();
        assert!(matches!(err, Error::ReferenceResolutionDepthExceeded { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_refs_are_invalid(refs: Refs) {
        let err = refs.resolve("nope", 1).await.unwrap_err();
        assert!(matches!(err, Error::VaultReferenceInvalid { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn packed_refs_back_missing_loose_files(refs: Refs) {
        refs.write_packed_refs(&BTreeMap::from([
            ("refs/heads/master".to_string(), oid(OID_A)),
            ("refs/tags/v1".to_string(), oid(OID_B)),
        ]))
        .await
        .unwrap();
        refs.update_ref("refs/heads/master", &oid(OID_B)).await.unwrap();

        // the loose file wins over the packed entry
        assert_eq!(refs.resolve("master", 1).await.unwrap(), oid(OID_B));
        assert_eq!(refs.resolve("tags/v1", 1).await.unwrap(), oid(OID_B));
        assert_eq!(
            refs.list_refs(REFS_DIR).await.unwrap(),
            vec!["refs/heads/master", "refs/tags/v1"]
        );
    }

    #[test]
    fn peeled_lines_and_comments_are_skipped() {
        let content = format!("{PACKED_REFS_HEADER}\n{OID_A} refs/tags/v1\n^{OID_B}\n");
        let refs = parse_packed_refs(&content).unwrap();

        assert_eq!(refs, BTreeMap::from([("refs/tags/v1".to_string(), oid(OID_A))]));
    }

    #[rstest]
    #[tokio::test]
    async fn pack_refs_moves_loose_refs(refs: Refs) {
        refs.set_symbolic(HEAD_REF_NAME, "refs/heads/master").await.unwrap();
        refs.update_ref("refs/heads/master", &oid(OID_A)).await.unwrap();

        refs.pack_refs().await.unwrap();

        assert!(refs.read_loose("refs/heads/master").await.unwrap().is_none());
        assert_eq!(refs.resolve_head(1).await.unwrap(), oid(OID_A));
    }

    #[rstest]
    #[tokio::test]
    async fn advertisement_lists_head_first(refs: Refs) {
        refs.set_symbolic(HEAD_REF_NAME, "refs/heads/master").await.unwrap();
        refs.update_ref("refs/heads/master", &oid(OID_A)).await.unwrap();
        refs.update_ref("refs/heads/aaa", &oid(OID_B)).await.unwrap();

        let advertised = refs.advertised_refs(1).await.unwrap();

        assert_eq!(
            advertised,
            vec![
                ("HEAD".to_string(), oid(OID_A)),
                ("refs/heads/aaa".to_string(), oid(OID_B)),
                ("refs/heads/master".to_string(), oid(OID_A)),
            ]
        );
    }
}
