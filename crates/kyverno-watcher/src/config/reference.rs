//! Artifact reference parsing.

use super::Provider;
use crate::error::{Result, WatcherError};

/// Splits an image base into owner and package.
///
/// Expected format: `registry/owner/package[/sub/...][:tag]`. The tag is cut
/// at the first `:` before splitting on `/`.
pub fn parse_image_base(image_base: &str) -> Result<(String, String)> {
    let without_tag = image_base.split(':').next().unwrap_or("");

    let parts: Vec<&str> = without_tag.split('/').collect();
    if parts.len() < 3 {
        return Err(WatcherError::Config(format!(
            "IMAGE_BASE must be in format ghcr.io/owner/package, got: {}",
            image_base
        )));
    }

    let owner = parts[1];
    let package = parts[2..].join("/");

    if owner.is_empty() || package.is_empty() {
        return Err(WatcherError::Config(format!(
            "could not extract owner and package from IMAGE_BASE: {}",
            image_base
        )));
    }

    Ok((owner.to_string(), package))
}

/// A parsed reference to the watched artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    raw: String,
    registry: String,
    owner: String,
    package: String,
    tag: Option<String>,
}

impl ArtifactReference {
    /// Parses a reference such as `ghcr.io/owner/policies:v1`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (owner, package) = parse_image_base(raw)?;
        let registry = raw.split('/').next().unwrap_or_default().to_string();

        Ok(Self {
            raw: raw.to_string(),
            registry,
            owner,
            package,
            tag: extract_tag(raw),
        })
    }

    /// Parses a reference the way `provider` addresses it.
    ///
    /// GitHub references go through [`parse_image_base`]. Artifactory
    /// references may carry a registry port, so the tag is removed first and
    /// the remaining path only has to be non-empty.
    pub fn parse_for(provider: Provider, raw: &str) -> Result<Self> {
        match provider {
            Provider::GitHub => Self::parse(raw),
            Provider::Artifactory => Self::parse_registry_path(raw),
        }
    }

    fn parse_registry_path(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let tag = extract_tag(raw);
        let repository = match &tag {
            Some(tag) => &raw[..raw.len() - tag.len() - 1],
            None => raw,
        };

        let mut segments = repository.split('/');
        let registry = segments.next().unwrap_or_default();
        let path: Vec<&str> = segments.collect();
        if registry.is_empty() || path.is_empty() || path.iter().any(|s| s.is_empty()) {
            return Err(WatcherError::Config(format!(
                "IMAGE_BASE must be in format registry/repository[:tag], got: {}",
                raw
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            registry: registry.to_string(),
            owner: path[0].to_string(),
            package: path[1..].join("/"),
            tag,
        })
    }

    /// The reference exactly as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Registry host, e.g. `ghcr.io`.
    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Package path below the owner, possibly nested (`team/policies`).
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Package path with `/` escaped for use as one URL path segment.
    pub fn package_normalized(&self) -> String {
        self.package.replace('/', "%2F")
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The reference with any tag removed.
    pub fn repository(&self) -> &str {
        match &self.tag {
            Some(tag) => &self.raw[..self.raw.len() - tag.len() - 1],
            None => &self.raw,
        }
    }

    /// The repository pinned to a specific tag.
    pub fn with_tag(&self, tag: &str) -> String {
        format!("{}:{}", self.repository(), tag)
    }
}

impl std::fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// The segment after the last `:`, unless it contains a `/` (then the colon
/// belonged to a registry port).
fn extract_tag(raw: &str) -> Option<String> {
    let (_, tag) = raw.rsplit_once(':')?;
    if tag.is_empty() || tag.contains('/') {
        None
    } else {
        Some(tag.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_base_simple() {
        let (owner, package) = parse_image_base("ghcr.io/myoung34/policies").unwrap();
        assert_eq!(owner, "myoung34");
        assert_eq!(package, "policies");
    }

    #[test]
    fn test_parse_image_base_nested_with_tag() {
        let (owner, package) =
            parse_image_base("ghcr.io/myoung34/kyverno-test/policies:v0.0.1").unwrap();
        assert_eq!(owner, "myoung34");
        assert_eq!(package, "kyverno-test/policies");

        let (owner, package) = parse_image_base("ghcr.io/foo/bar/baz/qux:latest").unwrap();
        assert_eq!(owner, "foo");
        assert_eq!(package, "bar/baz/qux");
    }

    #[test]
    fn test_parse_image_base_digest_like_tag() {
        let (owner, package) = parse_image_base("ghcr.io/owner/package:sha256-abcd1234").unwrap();
        assert_eq!(owner, "owner");
        assert_eq!(package, "package");
    }

    #[test]
    fn test_parse_image_base_rejects_invalid() {
        for input in ["invalid", "ghcr.io/owner", "ghcr.io/owner/", "", "ghcr.io//pkg"] {
            let result = parse_image_base(input);
            assert!(
                matches!(result, Err(WatcherError::Config(_))),
                "expected rejection for {input:?}"
            );
        }
    }

    #[test]
    fn test_reference_parts() {
        let reference = ArtifactReference::parse("ghcr.io/acme/team/policies:v1.2.0").unwrap();
        assert_eq!(reference.registry(), "ghcr.io");
        assert_eq!(reference.owner(), "acme");
        assert_eq!(reference.package(), "team/policies");
        assert_eq!(reference.package_normalized(), "team%2Fpolicies");
        assert_eq!(reference.tag(), Some("v1.2.0"));
        assert_eq!(reference.repository(), "ghcr.io/acme/team/policies");
        assert_eq!(
            reference.with_tag("v2.0.0"),
            "ghcr.io/acme/team/policies:v2.0.0"
        );
    }

    #[test]
    fn test_reference_without_tag() {
        let reference = ArtifactReference::parse("ghcr.io/acme/policies").unwrap();
        assert_eq!(reference.tag(), None);
        assert_eq!(reference.repository(), "ghcr.io/acme/policies");
        assert_eq!(reference.with_tag("v1"), "ghcr.io/acme/policies:v1");
    }

    #[test]
    fn test_extract_tag_ignores_empty_and_port() {
        assert_eq!(extract_tag("ghcr.io/acme/policies:"), None);
        assert_eq!(extract_tag("ghcr.io/acme/policies"), None);
        assert_eq!(
            extract_tag("artifactory.example.com/docker/policies:2024.1"),
            Some("2024.1".to_string())
        );
    }

    #[test]
    fn test_registry_path_with_port() {
        let reference = ArtifactReference::parse_for(
            Provider::Artifactory,
            "artifactory.example.com:443/docker/policies:v1",
        )
        .unwrap();
        assert_eq!(reference.registry(), "artifactory.example.com:443");
        assert_eq!(reference.tag(), Some("v1"));
        assert_eq!(
            reference.repository(),
            "artifactory.example.com:443/docker/policies"
        );
        assert_eq!(
            reference.with_tag("v2"),
            "artifactory.example.com:443/docker/policies:v2"
        );
        assert_eq!(reference.owner(), "docker");
        assert_eq!(reference.package(), "policies");
    }

    #[test]
    fn test_registry_path_with_port_and_no_tag() {
        let reference =
            ArtifactReference::parse_for(Provider::Artifactory, "host:5000/docker/policies")
                .unwrap();
        assert_eq!(reference.registry(), "host:5000");
        assert_eq!(reference.tag(), None);
        assert_eq!(reference.repository(), "host:5000/docker/policies");
    }

    #[test]
    fn test_registry_path_rejects_missing_repository() {
        for input in ["", "host:5000", "host:5000/", "host//policies:v1", "/docker/policies"] {
            assert!(
                matches!(
                    ArtifactReference::parse_for(Provider::Artifactory, input),
                    Err(WatcherError::Config(_))
                ),
                "expected rejection for {input:?}"
            );
        }
    }

    #[test]
    fn test_github_reference_keeps_strict_split() {
        assert!(ArtifactReference::parse_for(Provider::GitHub, "ghcr.io/acme").is_err());
        let reference =
            ArtifactReference::parse_for(Provider::GitHub, "ghcr.io/acme/policies:v1").unwrap();
        assert_eq!(reference.owner(), "acme");
    }
}
