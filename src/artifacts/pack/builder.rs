use crate::areas::database::Database;
use crate::artifacts::log::rev_list::{History, RevList};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::header::encode_object_header;
use crate::artifacts::pack::{PACK_SIGNATURE, PACK_VERSION};
use crate::errors::{Error, Result};
use anyhow::Context;
use byteorder::{NetworkEndian, WriteBytesExt};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::io::Write;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Objects selected for a pack, in emission order
#[derive(Debug, Clone, Default)]
pub struct PackPlan {
    pub objects: Vec<(ObjectId, ObjectType)>,
    pub history: History,
}

impl PackPlan {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Builds packfiles from the reachable closure of a set of wanted objects
#[derive(Debug, Clone)]
pub struct PackBuilder<'r> {
    database: &'r Database,
    depth: Option<usize>,
    since: Option<i64>,
    shallow: Vec<ObjectId>,
    max_tree_depth: usize,
}

impl<'r> PackBuilder<'r> {
    pub fn new(database: &'r Database) -> Self {
        PackBuilder {
            database,
            depth: None,
            since: None,
            shallow: Vec::new(),
            max_tree_depth: 256,
        }
    }

    pub fn depth(mut self, depth: Option<usize>) -> Self {
        self.depth = depth;
        self
    }

    pub fn since(mut self, since: Option<i64>) -> Self {
        self.since = since;
        self
    }

    /// Boundaries the peer reported as shallow
    pub fn shallow(mut self, shallow: Vec<ObjectId>) -> Self {
        self.shallow = shallow;
        self
    }

    pub fn max_tree_depth(mut self, max_tree_depth: usize) -> Self {
        self.max_tree_depth = max_tree_depth;
        self
    }

    /// Walk the closure of `wants`: commits, their trees and every entry below
    ///
    /// Blobs are listed from their tree entries and never read here. Every
    /// object in the closure is planned, including those in `haves`.
    pub async fn collect(&self, wants: &[ObjectId], haves: &[ObjectId]) -> Result<PackPlan> {
        if !haves.is_empty() {
            debug!(haves = haves.len(), "ignoring haves, packing the full closure");
        }

        let mut plan = PackPlan::default();
        let mut visited = HashSet::new();
        let mut commit_tips = Vec::new();
        let mut roots = Vec::new();

        for want in wants {
            let raw = self.database.read_object(want).await?;
            match raw.object_type {
                ObjectType::Commit => commit_tips.push(want.clone()),
                other => roots.push((want.clone(), other)),
            }
        }

        plan.history = RevList::new(self.database)
            .depth(self.depth)
            .since(self.since)
            .shallow(self.shallow.iter().cloned())
            .walk(&commit_tips)
            .await;
        if let Some((oid, reason)) = &plan.history.error {
            return Err(Error::corrupt(oid, reason));
        }

        for (oid, commit) in &plan.history.commits {
            if visited.insert(oid.clone()) {
                plan.objects.push((oid.clone(), ObjectType::Commit));
            }
            roots.push((commit.tree_oid().clone(), ObjectType::Tree));
        }

        for (oid, object_type) in roots {
            match object_type {
                ObjectType::Tree => self.collect_tree(&oid, &mut visited, &mut plan).await?,
                other => {
                    if visited.insert(oid.clone()) {
                        plan.objects.push((oid, other));
                    }
                }
            }
        }

        Ok(plan)
    }

    async fn collect_tree(
        &self,
        tree_oid: &ObjectId,
        visited: &mut HashSet<ObjectId>,
        plan: &mut PackPlan,
    ) -> Result<()> {
        let mut pending = vec![(tree_oid.clone(), 0)];

        while let Some((oid, depth)) = pending.pop() {
            if !visited.insert(oid.clone()) {
                continue;
            }
            if depth > self.max_tree_depth {
                return Err(Error::corrupt(&oid, "tree nesting is too deep"));
            }

            let tree = self
                .database
                .parse_object_as_tree(&oid)
                .await?
                .ok_or_else(|| Error::corrupt(&oid, "expected a tree"))?;
            plan.objects.push((oid.clone(), ObjectType::Tree));

            for entry in tree.entries() {
                let (_, entry) = entry.map_err(|err| Error::corrupt(&oid, err))?;
                if entry.is_tree() {
                    pending.push((entry.oid, depth + 1));
                } else if visited.insert(entry.oid.clone()) {
                    plan.objects.push((entry.oid, entry.mode.object_type()));
                }
            }
        }

        Ok(())
    }

    /// Stream the planned objects as a version 2 packfile
    ///
    /// Only one object is held in memory at a time. Returns the trailing
    /// checksum.
    pub async fn write<W>(&self, plan: &PackPlan, writer: &mut W) -> Result<ObjectId>
    where
        W: AsyncWrite + Unpin,
    {
        let mut hasher = Sha1::new();

        let mut header = Vec::with_capacity(12);
        header.extend_from_slice(PACK_SIGNATURE);
        WriteBytesExt::write_u32::<NetworkEndian>(&mut header, PACK_VERSION)?;
        WriteBytesExt::write_u32::<NetworkEndian>(&mut header, plan.objects.len() as u32)?;
        Self::emit(writer, &mut hasher, &header).await?;

        for (oid, object_type) in &plan.objects {
            let raw = self.database.read_object(oid).await?;
            if raw.object_type != *object_type {
                return Err(Error::corrupt(
                    oid,
                    format!("expected a {object_type}, found a {}", raw.object_type),
                ));
            }

            let mut entry = encode_object_header(raw.object_type, raw.payload.len());
            entry.extend_from_slice(&Self::compress(&raw.payload)?);
            Self::emit(writer, &mut hasher, &entry).await?;
        }

        let mut checksum = [0; 20];
        checksum.copy_from_slice(&hasher.finalize());
        writer.write_all(&checksum).await?;
        writer.flush().await?;

        let checksum = ObjectId::from_raw(&checksum);
        info!(objects = plan.len(), checksum = %checksum, "wrote pack");
        Ok(checksum)
    }

    /// Collect and serialize in one go
    pub async fn build(&self, wants: &[ObjectId], haves: &[ObjectId]) -> Result<Bytes> {
        let plan = self.collect(wants, haves).await?;
        let mut pack = Vec::new();
        self.write(&plan, &mut pack).await?;

        Ok(pack.into())
    }

    async fn emit<W>(writer: &mut W, hasher: &mut Sha1, data: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        hasher.update(data);
        writer.write_all(data).await?;
        Ok(())
    }

    fn compress(payload: &[u8]) -> Result<Vec<u8>> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(payload)
            .context("Unable to compress pack entry")?;

        Ok(encoder.finish().context("Unable to finish pack entry")?)
    }
}
