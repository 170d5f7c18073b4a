//! `release-assets-semver`: three pointers from one release listing.
//!
//! * `@latest` follows the host's latest-release endpoint.
//! * `@stable` is the highest non-prerelease semver release.
//! * `@beta` is the highest prerelease semver release.
//!
//! A repository without releases falls back to its highest semver tag.

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;
use vcdn_schema::{AssetSource, Provenance, SourceConfig, Target};

use super::{
    AdapterContext, AdapterError, Candidate, Origin, Resolution, SourceAdapter, build_at,
    channel_for, compile_asset_regex, fetch_raw_paths, fetch_release_assets, has_matching_asset,
    needs_work, release_identity, release_provenance, version_id_of,
};
use crate::artifact::ArtifactSet;
use crate::forges::{Release, Tag};
use crate::state::SyncState;
use crate::version::{highest, highest_any};

#[derive(Debug)]
pub struct ReleaseSemverAdapter {
    ctx: AdapterContext,
}

/// How a version's files will be obtained, decided from upstream metadata
/// and configuration alone so it can be part of the provenance.
fn plan(source: &SourceConfig, release: Option<&Release>, regex: Option<&Regex>) -> Option<AssetSource> {
    if release.is_some_and(|r| has_matching_asset(r, regex)) {
        Some(AssetSource::ReleaseAssets)
    } else if source.enabled_build().is_some() {
        Some(AssetSource::SourceBuild)
    } else if !source.file_paths().is_empty() {
        Some(AssetSource::RawFiles)
    } else {
        None
    }
}

impl ReleaseSemverAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    fn release_candidate(
        &self,
        source: &SourceConfig,
        state: &SyncState,
        target: Target,
        release: &Release,
        regex: Option<&Regex>,
    ) -> Result<Candidate, AdapterError> {
        let host = self.ctx.host.name();
        let version_id = version_id_of(&release.tag_name)?;
        let identity = release_identity(host, &source.repo, release);
        let asset_source = plan(source, Some(release), regex).unwrap_or(AssetSource::ReleaseAssets);
        Ok(Candidate {
            target,
            upstream_ref: release.tag_name.clone(),
            channel: Some(channel_for(source, &version_id)),
            needs_work: needs_work(state, &source.package, target, &identity),
            provenance: release_provenance(host, source, release, asset_source),
            version_id,
            identity,
            origin: Origin::Release(Box::new(release.clone())),
        })
    }

    fn push_release(
        &self,
        resolution: &mut Resolution,
        source: &SourceConfig,
        state: &SyncState,
        target: Target,
        release: &Release,
        regex: Option<&Regex>,
    ) {
        match self.release_candidate(source, state, target, release, regex) {
            Ok(candidate) => resolution.targets.push(Ok(candidate)),
            Err(e) => resolution.fail(target, e),
        }
    }

    async fn resolve_releases(
        &self,
        source: &SourceConfig,
        state: &SyncState,
        releases: &[Release],
        regex: Option<&Regex>,
    ) -> Resolution {
        let mut resolution = Resolution::default();

        match self.ctx.host.latest_release(&source.repo).await {
            Ok(Some(release)) if !release.tag_name.is_empty() => {
                self.push_release(&mut resolution, source, state, Target::Latest, &release, regex);
            }
            Ok(_) => resolution.fail(
                Target::Latest,
                AdapterError::Unresolved(format!("{} has no latest release", source.repo)),
            ),
            Err(e) => resolution.fail(Target::Latest, e.into()),
        }

        match highest(releases, |r| r.tag_name.as_str(), false) {
            Some((release, _)) => {
                self.push_release(&mut resolution, source, state, Target::Stable, release, regex);
            }
            None => resolution
                .notes
                .push("no stable semver release; @stable left as is".into()),
        }

        match highest(releases, |r| r.tag_name.as_str(), true) {
            Some((release, _)) => {
                self.push_release(&mut resolution, source, state, Target::Beta, release, regex);
            }
            None => resolution
                .notes
                .push("no prerelease published; @beta left as is".into()),
        }

        resolution
    }

    async fn resolve_tags(
        &self,
        source: &SourceConfig,
        state: &SyncState,
    ) -> Result<Resolution, AdapterError> {
        let tags: Vec<Tag> = self.ctx.host.list_tags(&source.repo).await?;
        let Some((tag, version)) = highest_any(&tags, |t| t.name.as_str()) else {
            return Err(AdapterError::Unresolved(format!(
                "{} has no releases and no semver tags",
                source.repo
            )));
        };
        debug!(package = %source.package, tag = %tag.name, "no releases; using highest tag");

        let host = self.ctx.host.name();
        let version_id = version_id_of(&tag.name)?;
        let identity = format!("{host}:{}@{}#{}", source.repo, tag.name, tag.commit.sha);
        let channel = channel_for(source, &version_id);
        let provenance = Provenance {
            host: host.to_string(),
            kind: source.kind,
            repo: source.repo.clone(),
            tag: Some(tag.name.clone()),
            git_ref: None,
            commit: Some(tag.commit.sha.clone()),
            release_url: None,
            published_at: None,
            asset_source: plan(source, None, None).unwrap_or(AssetSource::SourceBuild),
        };

        let channel_target = if version.pre.is_empty() {
            Target::Stable
        } else {
            Target::Beta
        };
        let mut resolution = Resolution::default();
        for target in [Target::Latest, channel_target] {
            resolution.targets.push(Ok(Candidate {
                target,
                upstream_ref: tag.name.clone(),
                version_id: version_id.clone(),
                channel: Some(channel),
                identity: identity.clone(),
                needs_work: needs_work(state, &source.package, target, &identity),
                origin: Origin::Tag {
                    tag: tag.name.clone(),
                    commit: tag.commit.sha.clone(),
                },
                provenance: provenance.clone(),
            }));
        }
        Ok(resolution)
    }
}

#[async_trait]
impl SourceAdapter for ReleaseSemverAdapter {
    async fn resolve(
        &self,
        source: &SourceConfig,
        state: &SyncState,
    ) -> Result<Resolution, AdapterError> {
        let regex = compile_asset_regex(source)?;
        let releases = self.ctx.host.list_releases(&source.repo).await?;
        if releases.is_empty() {
            return self.resolve_tags(source, state).await;
        }
        Ok(self
            .resolve_releases(source, state, &releases, regex.as_ref())
            .await)
    }

    async fn materialize(
        &self,
        source: &SourceConfig,
        candidate: &Candidate,
    ) -> Result<ArtifactSet, AdapterError> {
        let regex = compile_asset_regex(source)?;
        let host = self.ctx.host.as_ref();
        let (release, rev) = match &candidate.origin {
            Origin::Release(release) => (Some(release.as_ref()), release.tag_name.as_str()),
            Origin::Tag { commit, .. } => (None, commit.as_str()),
            Origin::Commit { sha } => (None, sha.as_str()),
        };

        match (plan(source, release, regex.as_ref()), release, regex.as_ref()) {
            (Some(AssetSource::ReleaseAssets), Some(release), Some(regex)) => {
                fetch_release_assets(host, source, release, regex).await
            }
            (Some(AssetSource::SourceBuild), ..) => build_at(&self.ctx, source, rev).await,
            (Some(AssetSource::RawFiles), ..) => fetch_raw_paths(host, source, rev).await,
            _ => Err(AdapterError::NoMatch {
                what: format!(
                    "{} has no asset matching asset_regex and no build or paths are configured",
                    candidate.upstream_ref
                ),
                available: release
                    .map(|r| r.assets.iter().map(|a| a.name.clone()).collect())
                    .unwrap_or_default(),
            }),
        }
    }
}
