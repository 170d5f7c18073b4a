use async_trait::async_trait;
use vcdn_schema::{AssetSource, Provenance, SourceConfig, Target};

use super::{
    AdapterContext, AdapterError, Candidate, Origin, Resolution, SourceAdapter, fetch_raw_paths,
    needs_work, version_id_of,
};
use crate::artifact::ArtifactSet;
use crate::state::SyncState;

/// Length of the commit prefix used as version id.
const SHORT_SHA: usize = 7;

/// Explicit files pinned to the commit a ref resolves to. Drives `@latest`.
#[derive(Debug)]
pub struct RawFileAdapter {
    ctx: AdapterContext,
}

impl RawFileAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    async fn latest(
        &self,
        source: &SourceConfig,
        state: &SyncState,
    ) -> Result<Candidate, AdapterError> {
        let host = self.ctx.host.name();
        let git_ref = source.git_ref();
        let sha = self.ctx.host.resolve_ref(&source.repo, git_ref).await?;
        if sha.is_empty() {
            return Err(AdapterError::Unresolved(format!(
                "{}@{git_ref} resolved to an empty commit",
                source.repo
            )));
        }

        let version_id = version_id_of(sha.get(..SHORT_SHA).unwrap_or(sha.as_str()))?;
        let identity = format!(
            "{host}:{}@{sha}:{}",
            source.repo,
            source.file_paths().join(",")
        );

        Ok(Candidate {
            target: Target::Latest,
            upstream_ref: sha.clone(),
            version_id,
            channel: source.channel,
            needs_work: needs_work(state, &source.package, Target::Latest, &identity),
            identity,
            provenance: Provenance {
                host: host.to_string(),
                kind: source.kind,
                repo: source.repo.clone(),
                tag: None,
                git_ref: Some(git_ref.to_string()),
                commit: Some(sha.clone()),
                release_url: None,
                published_at: None,
                asset_source: AssetSource::RawFiles,
            },
            origin: Origin::Commit { sha },
        })
    }
}

#[async_trait]
impl SourceAdapter for RawFileAdapter {
    async fn resolve(
        &self,
        source: &SourceConfig,
        state: &SyncState,
    ) -> Result<Resolution, AdapterError> {
        let mut resolution = Resolution::default();
        match self.latest(source, state).await {
            Ok(candidate) => resolution.targets.push(Ok(candidate)),
            Err(e) => resolution.fail(Target::Latest, e),
        }
        Ok(resolution)
    }

    async fn materialize(
        &self,
        source: &SourceConfig,
        candidate: &Candidate,
    ) -> Result<ArtifactSet, AdapterError> {
        let Origin::Commit { sha } = &candidate.origin else {
            return Err(AdapterError::Unresolved(format!(
                "{} is not a commit",
                candidate.upstream_ref
            )));
        };
        // Always the resolved commit, never the moving ref.
        fetch_raw_paths(self.ctx.host.as_ref(), source, sha).await
    }
}
