//! Per-property change detection

use crate::compare::{ChangeResult, ChangeStatus};
use crate::config::EngineConfig;
use crate::error::{ConfigError, SnapshotError, SnapshotResult};
use crate::property::PropertySpec;
use crate::snapshot::Snapshot;
use tracing::{debug, warn};

/// Compares a property's current snapshot against the one recorded for it
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    parallel_threshold: usize,
    max_reported_deltas: Option<usize>,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ChangeDetector {
    /// Create a detector from engine settings
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            parallel_threshold: config.parallel_compare_threshold,
            max_reported_deltas: config.max_reported_deltas,
        }
    }

    /// Classify how `spec` changed between two runs.
    ///
    /// `previous` is absent when no snapshot was recorded for the property,
    /// `current` when its source could not be resolved this time.
    ///
    /// # Errors
    ///
    /// - `SnapshotError::StrategyMismatch` if either snapshot was produced
    ///   under a different normalization than `spec` declares
    /// - `ConfigError::UnresolvedProperty` if `current` is absent and the
    ///   property is required
    pub fn detect(
        &self,
        spec: &PropertySpec,
        previous: Option<&Snapshot>,
        current: Option<&Snapshot>,
    ) -> SnapshotResult<ChangeResult> {
        for snapshot in previous.into_iter().chain(current) {
            if snapshot.normalization() != spec.normalization() {
                return Err(SnapshotError::StrategyMismatch {
                    property: spec.name().to_string(),
                    expected: spec.normalization(),
                    found: snapshot.normalization(),
                });
            }
        }

        let mut result = match (previous, current) {
            (Some(previous), Some(current)) => spec.compare_strategy().compare_with_threshold(
                previous,
                current,
                self.parallel_threshold,
            ),
            (None, Some(current)) if current.is_empty() && spec.is_optional() => {
                ChangeResult::unchanged()
            }
            (None, Some(current)) => ChangeResult::all_added(current),
            (previous, None) if spec.is_optional() => {
                previous.map_or_else(ChangeResult::unchanged, ChangeResult::all_removed)
            }
            (_, None) => {
                return Err(ConfigError::UnresolvedProperty {
                    unit: spec.unit().to_string(),
                    name: spec.name().to_string(),
                    role: spec.role(),
                }
                .into());
            }
        };

        if result.status == ChangeStatus::Incompatible {
            warn!(
                "Property {} of {} has colliding identities: {}",
                spec,
                spec.unit(),
                result.conflicts.join(", ")
            );
        } else {
            debug!(
                "Property {} of {}: {} ({} deltas)",
                spec,
                spec.unit(),
                result.status,
                result.details.len()
            );
        }

        if let Some(max) = self.max_reported_deltas {
            result.truncate(max);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::DeltaKind;
    use crate::normalization::NormalizationStrategy;
    use crate::property::FileSource;
    use crate::snapshot::{FileDigest, NormalizedEntry};
    use tracing_test::traced_test;

    fn spec(optional: bool) -> PropertySpec {
        PropertySpec::input("compile", false, FileSource::collection(["src"]))
            .with_property_name("sources")
            .with_snapshot_normalization_strategy(NormalizationStrategy::Relative)
            .optional(optional)
            .build()
            .unwrap()
    }

    fn snapshot(entries: &[(&str, &str)]) -> Snapshot {
        Snapshot::new(
            NormalizationStrategy::Relative,
            entries
                .iter()
                .map(|(id, content)| NormalizedEntry::new(*id, FileDigest::of(content.as_bytes())))
                .collect(),
        )
    }

    #[test]
    fn test_first_run_reports_everything_added() {
        let current = snapshot(&[("a.c", "a"), ("b.c", "b")]);
        let result = ChangeDetector::default()
            .detect(&spec(false), None, Some(&current))
            .unwrap();

        assert_eq!(result.status, ChangeStatus::Added);
        assert_eq!(result.details.len(), 2);
        assert!(result.details.iter().all(|d| d.kind == DeltaKind::Added));
    }

    #[test]
    fn test_first_run_empty_optional_is_unchanged() {
        let current = snapshot(&[]);
        let result = ChangeDetector::default()
            .detect(&spec(true), None, Some(&current))
            .unwrap();
        assert!(result.is_unchanged());
    }

    #[test]
    fn test_optional_absence_reports_removed() {
        let previous = snapshot(&[("a.c", "a")]);
        let result = ChangeDetector::default()
            .detect(&spec(true), Some(&previous), None)
            .unwrap();

        assert_eq!(result.status, ChangeStatus::Removed);
        assert_eq!(result.details[0].identity, "a.c");
        assert_eq!(result.details[0].kind, DeltaKind::Removed);
    }

    #[test]
    fn test_required_absence_is_a_config_error() {
        let previous = snapshot(&[("a.c", "a")]);
        let err = ChangeDetector::default()
            .detect(&spec(false), Some(&previous), None)
            .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Config(ConfigError::UnresolvedProperty { .. })
        ));
    }

    #[test]
    fn test_strategy_mismatch_is_fatal() {
        let absolute = Snapshot::new(NormalizationStrategy::Absolute, Vec::new());
        let err = ChangeDetector::default()
            .detect(&spec(false), None, Some(&absolute))
            .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::StrategyMismatch {
                expected: NormalizationStrategy::Relative,
                found: NormalizationStrategy::Absolute,
                ..
            }
        ));
    }

    #[test]
    fn test_detection_is_deterministic_across_threads() {
        let previous = snapshot(&[("a.c", "1"), ("b.c", "2"), ("c.c", "3")]);
        let current = snapshot(&[("c.c", "3"), ("b.c", "changed"), ("d.c", "4")]);
        let detector = ChangeDetector::default();
        let spec = spec(false);

        let expected = detector.detect(&spec, Some(&previous), Some(&current)).unwrap();
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| detector.detect(&spec, Some(&previous), Some(&current))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
        });

        assert!(results.iter().all(|result| *result == expected));
    }

    #[traced_test]
    #[test]
    fn test_collision_is_logged_and_incompatible() {
        let colliding = Snapshot::new(
            NormalizationStrategy::Relative,
            vec![
                NormalizedEntry::new("dup.c", FileDigest::of(b"1")),
                NormalizedEntry::new("dup.c", FileDigest::of(b"2")),
            ],
        );
        let result = ChangeDetector::default()
            .detect(&spec(false), Some(&colliding), Some(&colliding))
            .unwrap();

        assert_eq!(result.status, ChangeStatus::Incompatible);
        assert!(logs_contain("colliding identities"));
    }

    #[test]
    fn test_reported_deltas_are_capped() {
        let config = EngineConfig {
            max_reported_deltas: Some(1),
            ..EngineConfig::default()
        };
        let current = snapshot(&[("a.c", "a"), ("b.c", "b"), ("c.c", "c")]);
        let result = ChangeDetector::new(&config)
            .detect(&spec(false), None, Some(&current))
            .unwrap();

        assert_eq!(result.status, ChangeStatus::Added);
        assert_eq!(result.details.len(), 1);
        assert!(result.truncated);
    }
}
