// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `providers/mod.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::constants::DEFAULT_CLOUDFLARE_API_URL;
    use crate::dns_errors::ConfigError;
    use std::collections::BTreeMap;

    fn settings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn factory() -> BackendFactory {
        BackendFactory::new(reqwest::Client::new(), DEFAULT_CLOUDFLARE_API_URL)
    }

    #[test]
    fn test_provider_kind_from_annotation() {
        assert_eq!(
            ProviderKind::from_annotation("cloudflare"),
            Some(ProviderKind::Cloudflare)
        );
        assert_eq!(ProviderKind::from_annotation("bind"), Some(ProviderKind::Bind));
        assert_eq!(ProviderKind::from_annotation(" BIND "), Some(ProviderKind::Bind));
        assert_eq!(ProviderKind::from_annotation("route53"), None);
        assert_eq!(ProviderKind::from_annotation(""), None);
    }

    #[test]
    fn test_provider_kind_round_trips_annotation_value() {
        for kind in [ProviderKind::Cloudflare, ProviderKind::Bind] {
            assert_eq!(ProviderKind::from_annotation(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_record_type_wire_names() {
        assert_eq!(RecordType::A.to_string(), "A");
        assert_eq!(RecordType::Txt.to_string(), "TXT");
    }

    #[test]
    fn test_content_matches_filter() {
        assert!(content_matches("anything", None));
        assert!(content_matches("kube-dns-manager", Some("kube-dns-manager")));
        assert!(content_matches("\"kube-dns-manager\"", Some("kube-dns-manager")));
        assert!(!content_matches("google-site-verification=abc", Some("kube-dns-manager")));
    }

    #[test]
    fn test_required_key_rejects_missing_and_blank() {
        let source = settings(&[("zoneid", "abc"), ("token", "   ")]);

        assert_eq!(required_key("cf", &source, "zoneid").unwrap(), "abc");
        assert!(matches!(
            required_key("cf", &source, "token"),
            Err(ConfigError::MissingKey { ref key, .. }) if key == "token"
        ));
        assert!(matches!(
            required_key("cf", &source, "absent"),
            Err(ConfigError::MissingKey { ref source_name, .. }) if source_name == "cf"
        ));
    }

    #[test]
    fn test_optional_key_default_and_parse() {
        let source = settings(&[("ttl", "120"), ("proxied", ""), ("bad", "nope")]);

        assert_eq!(optional_key("cf", &source, "ttl", 1u32).unwrap(), 120);
        assert!(!optional_key("cf", &source, "proxied", false).unwrap());
        assert_eq!(optional_key("cf", &source, "missing", 7u32).unwrap(), 7);
        assert!(matches!(
            optional_key("cf", &source, "bad", 1u32),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "bad"
        ));
    }

    #[test]
    fn test_factory_builds_cloudflare() {
        let provider = factory()
            .build(
                ProviderKind::Cloudflare,
                "cf",
                &settings(&[("zoneid", "z"), ("token", "t")]),
            )
            .unwrap();
        assert_eq!(provider.provider_name(), "cloudflare");
    }

    #[test]
    fn test_factory_builds_bind() {
        let provider = factory()
            .build(
                ProviderKind::Bind,
                "bind-source",
                &settings(&[
                    ("server", "10.0.0.53"),
                    ("zone", "example.com"),
                    ("keyname", "ddns-key"),
                    ("hmackey", "dGVzdC1zZWNyZXQ="),
                ]),
            )
            .unwrap();
        assert_eq!(provider.provider_name(), "bind");
    }

    #[test]
    fn test_factory_reports_missing_keys() {
        let result = factory().build(ProviderKind::Bind, "bind-source", &settings(&[]));
        assert!(matches!(
            result,
            Err(ConfigError::MissingKey { ref key, .. }) if key == "server"
        ));
    }
}
