use async_trait::async_trait;
use vcdn_schema::{AssetSource, SourceConfig, Target};

use super::{
    AdapterContext, AdapterError, Candidate, Origin, Resolution, SourceAdapter, channel_for,
    compile_asset_regex, fetch_release_assets, needs_work, release_identity, release_provenance,
    version_id_of,
};
use crate::artifact::ArtifactSet;
use crate::state::SyncState;

/// Publishes the assets of the host's "latest release" to `@latest`.
#[derive(Debug)]
pub struct ReleaseAssetAdapter {
    ctx: AdapterContext,
}

impl ReleaseAssetAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    async fn latest(
        &self,
        source: &SourceConfig,
        state: &SyncState,
    ) -> Result<Candidate, AdapterError> {
        let host = self.ctx.host.as_ref();
        let release = host
            .latest_release(&source.repo)
            .await?
            .ok_or_else(|| AdapterError::Unresolved(format!("{} has no latest release", source.repo)))?;

        if release.tag_name.trim().is_empty() {
            return Err(AdapterError::Unresolved(format!(
                "latest release of {} has an empty tag",
                source.repo
            )));
        }
        let version_id = version_id_of(&release.tag_name)?;

        let identity = release_identity(host.name(), &source.repo, &release);
        Ok(Candidate {
            target: Target::Latest,
            upstream_ref: release.tag_name.clone(),
            channel: Some(channel_for(source, &version_id)),
            needs_work: needs_work(state, &source.package, Target::Latest, &identity),
            provenance: release_provenance(host.name(), source, &release, AssetSource::ReleaseAssets),
            version_id,
            identity,
            origin: Origin::Release(Box::new(release)),
        })
    }
}

#[async_trait]
impl SourceAdapter for ReleaseAssetAdapter {
    async fn resolve(
        &self,
        source: &SourceConfig,
        state: &SyncState,
    ) -> Result<Resolution, AdapterError> {
        if compile_asset_regex(source)?.is_none() {
            return Err(AdapterError::Config(
                "release-asset sources need an asset_regex".into(),
            ));
        }

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
        let Origin::Release(release) = &candidate.origin else {
            return Err(AdapterError::Unresolved(format!(
                "{} is not a release",
                candidate.upstream_ref
            )));
        };
        let regex = compile_asset_regex(source)?
            .ok_or_else(|| AdapterError::Config("missing asset_regex".into()))?;
        fetch_release_assets(self.ctx.host.as_ref(), source, release, &regex).await
    }
}
