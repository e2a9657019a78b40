//! Known services and tunnel planning
//!
//! The registry maps service names to their default [`AddressSpec`]. It is
//! built once at startup and never mutated.
//!
//! Known quirk: `cache` listens on 6379 like `message-bus`, so it is left
//! out of the default "all services" plan. It can still be requested by
//! name.

use std::collections::{BTreeMap, BTreeSet};

use crate::address::AddressSpec;
use crate::error::ConfigError;

/// Built-in services as `(name, local port, remote host, remote port)`
const BUILTIN_SERVICES: &[(&str, u16, &str, u16)] = &[
    ("message-bus", 6379, "message-bus", 6379),
    ("datastore-reader", 9010, "datastore-reader", 9010),
    ("datastore-writer", 9011, "datastore-writer", 9011),
    ("backend-action", 9002, "backend", 9002),
    ("backend-presenter", 9003, "backend", 9003),
    ("autoupdate", 9012, "autoupdate", 9012),
    ("permission", 9005, "permission", 9005),
    ("auth", 9004, "auth", 9004),
    ("media", 9006, "media", 9006),
    ("postgres", 5432, "postgres", 5432),
    ("cache", 6379, "cache", 6379),
];

/// Services left out of the default plan
const BUILTIN_EXCLUDED: &[&str] = &["cache"];

/// Immutable table of known services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistry {
    services: BTreeMap<String, AddressSpec>,
    excluded_from_default: BTreeSet<String>,
}

impl ServiceRegistry {
    /// Build a registry from explicit entries
    pub fn new(
        services: impl IntoIterator<Item = (String, AddressSpec)>,
        excluded_from_default: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            services: services.into_iter().collect(),
            excluded_from_default: excluded_from_default.into_iter().collect(),
        }
    }

    /// The built-in service table
    pub fn builtin() -> Self {
        let services = BUILTIN_SERVICES.iter().map(|(name, port, host, hostport)| {
            (name.to_string(), AddressSpec::new(*port, *host, *hostport))
        });
        Self::new(services, BUILTIN_EXCLUDED.iter().map(|s| s.to_string()))
    }

    /// Build a registry from `name -> "[bind:]port:host:hostport"` strings
    ///
    /// An empty map yields the built-in table. Custom tables have no
    /// default exclusions.
    pub fn from_config(entries: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Ok(Self::builtin());
        }

        let services = entries
            .iter()
            .map(|(name, spec)| Ok((name.clone(), AddressSpec::parse(spec)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self::new(services, std::iter::empty()))
    }

    /// Look up a service by name
    pub fn resolve(&self, name: &str) -> Result<&AddressSpec, ConfigError> {
        self.services
            .get(name)
            .ok_or_else(|| ConfigError::UnknownService {
                name: name.to_string(),
                valid: self.names(),
            })
    }

    /// All service names in registry order
    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Services included when no tunnel is requested explicitly
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &AddressSpec)> {
        self.services
            .iter()
            .filter(|(name, _)| !self.excluded_from_default.contains(*name))
            .map(|(name, spec)| (name.as_str(), spec))
    }

    /// Number of known services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Resolve the tunnels to open
    ///
    /// With neither names nor explicit specs every default service is
    /// planned. Otherwise explicit specs come first, then named services,
    /// each in argument order. Identical specs collapse into one, with an
    /// omitted bind host equal to [`crate::address::ANY_INTERFACE`]. Two
    /// different specs whose listeners overlap are rejected.
    pub fn build_plan(
        &self,
        names: &[String],
        explicit: &[AddressSpec],
    ) -> Result<Vec<AddressSpec>, ConfigError> {
        if names.is_empty() && explicit.is_empty() {
            return Ok(self.defaults().map(|(_, spec)| spec.clone()).collect());
        }

        let mut candidates = explicit.to_vec();
        for name in names {
            candidates.push(self.resolve(name)?.clone());
        }

        let mut plan: Vec<AddressSpec> = Vec::with_capacity(candidates.len());
        for spec in candidates {
            if plan.iter().any(|planned| planned.same_tunnel(&spec)) {
                continue;
            }
            if let Some(taken) = plan.iter().find(|planned| planned.binds_overlap(&spec)) {
                return Err(ConfigError::DuplicateBind {
                    bind: spec.bind_address(),
                    first: taken.to_string(),
                    second: spec.to_string(),
                });
            }
            plan.push(spec);
        }

        Ok(plan)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_resolve() {
        let registry = ServiceRegistry::builtin();
        let spec = registry.resolve("backend-presenter").unwrap();
        assert_eq!(spec.bind_address(), "0.0.0.0:9003");
        assert_eq!(spec.remote_address(), "backend:9003");
        assert_eq!(registry.len(), 11);
    }

    #[test]
    fn test_empty_plan_is_registry_minus_cache() {
        let registry = ServiceRegistry::builtin();
        let plan = registry.build_plan(&[], &[]).unwrap();

        assert_eq!(plan.len(), registry.len() - 1);
        assert!(plan.iter().all(|s| s.remote_host != "cache"));
        for name in registry.names().iter().filter(|n| *n != "cache") {
            assert!(plan.contains(registry.resolve(name).unwrap()), "{name} missing");
        }
    }

    #[test]
    fn test_cache_can_be_requested_by_name() {
        let registry = ServiceRegistry::builtin();
        let plan = registry.build_plan(&names(&["cache"]), &[]).unwrap();
        assert_eq!(plan, vec![AddressSpec::new(6379, "cache", 6379)]);
    }

    #[test]
    fn test_unknown_service_lists_valid_names() {
        let registry = ServiceRegistry::builtin();
        let err = registry
            .build_plan(&names(&["auth", "nope"]), &[])
            .unwrap_err();

        match &err {
            ConfigError::UnknownService { name, valid } => {
                assert_eq!(name, "nope");
                assert!(valid.contains(&"auth".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("nope"));
        assert!(err.to_string().contains("datastore-reader"));
    }

    #[test]
    fn test_explicit_first_then_named() {
        let registry = ServiceRegistry::builtin();
        let explicit = vec![AddressSpec::parse("localhost:8080:auth:9004").unwrap()];
        let plan = registry
            .build_plan(&names(&["media", "auth"]), &explicit)
            .unwrap();

        let rendered: Vec<String> = plan.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["localhost:8080:auth:9004", "9006:media:9006", "9004:auth:9004"]
        );
    }

    #[test]
    fn test_identical_specs_are_deduplicated() {
        let registry = ServiceRegistry::builtin();
        let plan = registry
            .build_plan(
                &names(&["auth", "auth"]),
                &[AddressSpec::parse(":9004:auth:9004").unwrap()],
            )
            .unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_conflicting_bind_is_rejected() {
        let registry = ServiceRegistry::builtin();
        let err = registry
            .build_plan(&names(&["message-bus", "cache"]), &[])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateBind { ref bind, .. } if bind == "0.0.0.0:6379"));
    }

    #[test]
    fn test_spelled_out_wildcard_is_deduplicated() {
        let registry = ServiceRegistry::builtin();
        let plan = registry
            .build_plan(
                &names(&["auth"]),
                &[AddressSpec::parse("0.0.0.0:9004:auth:9004").unwrap()],
            )
            .unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_specific_host_conflicts_with_wildcard() {
        let registry = ServiceRegistry::builtin();
        let err = registry
            .build_plan(
                &names(&["auth"]),
                &[AddressSpec::parse("127.0.0.1:9004:other:1").unwrap()],
            )
            .unwrap_err();
        match err {
            ConfigError::DuplicateBind { first, second, .. } => {
                assert_eq!(first, "127.0.0.1:9004:other:1");
                assert_eq!(second, "9004:auth:9004");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_distinct_hosts_share_a_port() {
        let registry = ServiceRegistry::builtin();
        let plan = registry
            .build_plan(
                &[],
                &[
                    AddressSpec::parse("127.0.0.1:9004:a:1").unwrap(),
                    AddressSpec::parse("127.0.0.2:9004:b:1").unwrap(),
                ],
            )
            .unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_custom_table_from_config() {
        let mut entries = BTreeMap::new();
        entries.insert("web".to_string(), "8080:web:80".to_string());
        let registry = ServiceRegistry::from_config(&entries).unwrap();

        assert_eq!(registry.names(), vec!["web"]);
        assert_eq!(
            registry.build_plan(&[], &[]).unwrap(),
            vec![AddressSpec::new(8080, "web", 80)]
        );
    }

    #[test]
    fn test_invalid_custom_entry() {
        let mut entries = BTreeMap::new();
        entries.insert("web".to_string(), "web:80".to_string());
        assert!(ServiceRegistry::from_config(&entries).is_err());
    }
}
