//! Groups a stream of [`Provider`] records into [`ProviderVersion`] rollups.

use crate::model::{Platform, Provider, ProviderVersion};
use std::collections::BTreeMap;

/// Groups `providers` by `(namespace, name, version)`, accumulating a
/// deduplicated, sorted set of [`Platform`]s per group. Iteration order of
/// the result is stable: sorted by version descending (semver-aware, with a
/// lexicographic fallback for unparseable versions), then by namespace and
/// name. Platforms within a version are already ordered by `os` then `arch`
/// via [`Platform`]'s derived `Ord`. An empty input yields an empty output.
pub fn collect(providers: impl IntoIterator<Item = Provider>) -> Vec<ProviderVersion> {
    let mut groups: BTreeMap<(String, String, String), std::collections::BTreeSet<Platform>> =
        BTreeMap::new();

    for p in providers {
        groups
            .entry((p.namespace, p.name, p.version))
            .or_default()
            .insert(Platform::new(p.os, p.arch));
    }

    let mut versions: Vec<ProviderVersion> = groups
        .into_iter()
        .map(|((namespace, name, version), platforms)| ProviderVersion {
            namespace,
            name,
            version,
            platforms,
        })
        .collect();

    versions.sort_by(|a, b| {
        a.namespace
            .cmp(&b.namespace)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| compare_versions_desc(&a.version, &b.version))
    });

    versions
}

fn compare_versions_desc(a: &str, b: &str) -> std::cmp::Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => vb.cmp(&va),
        _ => b.cmp(a),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(ns: &str, name: &str, version: &str, os: &str, arch: &str) -> Provider {
        Provider {
            hostname: String::new(),
            namespace: ns.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            os: os.to_string(),
            arch: arch.to_string(),
            filename: String::new(),
            shasum: String::new(),
            download_url: String::new(),
            shasums_url: String::new(),
            shasums_signature_url: String::new(),
            signing_keys: crate::model::SigningKeys {
                gpg_public_keys: vec![],
            },
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(collect(std::iter::empty()).is_empty());
    }

    #[test]
    fn groups_by_namespace_name_version_and_dedupes_platforms() {
        let providers = vec![
            provider("hashicorp", "random", "3.1.0", "linux", "amd64"),
            provider("hashicorp", "random", "3.1.0", "linux", "amd64"),
            provider("hashicorp", "random", "3.1.0", "darwin", "arm64"),
        ];
        let versions = collect(providers);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].platforms.len(), 2);
    }

    #[test]
    fn sorts_versions_descending() {
        let providers = vec![
            provider("hashicorp", "random", "3.0.0", "linux", "amd64"),
            provider("hashicorp", "random", "3.2.0", "linux", "amd64"),
            provider("hashicorp", "random", "3.1.0", "linux", "amd64"),
        ];
        let versions = collect(providers);
        let ordered: Vec<&str> = versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(ordered, vec!["3.2.0", "3.1.0", "3.0.0"]);
    }

    #[test]
    fn platforms_are_sorted_by_os_then_arch() {
        let providers = vec![
            provider("hashicorp", "random", "3.1.0", "windows", "amd64"),
            provider("hashicorp", "random", "3.1.0", "darwin", "arm64"),
            provider("hashicorp", "random", "3.1.0", "darwin", "amd64"),
        ];
        let versions = collect(providers);
        let platforms: Vec<(String, String)> = versions[0]
            .platforms
            .iter()
            .map(|p| (p.os.clone(), p.arch.clone()))
            .collect();
        assert_eq!(
            platforms,
            vec![
                ("darwin".to_string(), "amd64".to_string()),
                ("darwin".to_string(), "arm64".to_string()),
                ("windows".to_string(), "amd64".to_string()),
            ]
        );
    }

    #[test]
    fn scenario_s1_single_upload_single_version() {
        let versions = collect(vec![provider("hashicorp", "random", "3.1.0", "linux", "amd64")]);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, "3.1.0");
        assert_eq!(versions[0].platforms.len(), 1);
        let only = versions[0].platforms.iter().next().unwrap();
        assert_eq!(only.os, "linux");
        assert_eq!(only.arch, "amd64");
    }
}
