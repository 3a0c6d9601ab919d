//! Objective evaluation — one fresh metric snapshot per tick.

use std::time::SystemTime;

use tracing::{info, warn};

use surge_core::{EvalError, MetricSample, Objective, Verdict};

use crate::client::{MetricSource, QueryOutcome};

/// Evaluates the configured objectives against the metrics backend.
pub struct Evaluator<S> {
    source: S,
}

impl<S: MetricSource> Evaluator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Query every objective and aggregate the checks into a verdict.
    ///
    /// All objectives are evaluated on every call — no short-circuit on
    /// the first failure — so the report stays complete even when the
    /// ramp is about to stop. A query error on any objective aborts the
    /// whole evaluation: acting on a partial snapshot over a broken
    /// metrics path is unsafe.
    pub async fn evaluate(&self, objectives: &[Objective]) -> Result<Verdict, EvalError> {
        let mut checks = Vec::with_capacity(objectives.len());

        for objective in objectives {
            let outcome =
                self.source
                    .query(&objective.query)
                    .await
                    .map_err(|source| EvalError {
                        objective: objective.name.clone(),
                        source,
                    })?;

            let value = match outcome {
                QueryOutcome::Value(v) => Some(v),
                QueryOutcome::Indeterminate => None,
            };
            let sample = MetricSample {
                objective: objective.name.clone(),
                value,
                at: SystemTime::now(),
            };
            let check = objective.check(sample);

            // Audit trail: every evaluated objective is logged with its
            // value and outcome, regardless of the overall verdict.
            match check.sample.value {
                Some(v) => info!(
                    objective = %objective.name,
                    value = v,
                    threshold = objective.threshold,
                    unit = %objective.unit,
                    passed = check.passed,
                    "objective evaluated"
                ),
                None => warn!(
                    objective = %objective.name,
                    "no data for objective yet, passing with a flag"
                ),
            }

            checks.push(check);
        }

        Ok(Verdict::from_checks(checks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use surge_core::{Comparison, QueryError};

    /// Scripted metric source: each expression maps to a queue of
    /// outcomes consumed one per query.
    struct ScriptedSource {
        scripts: Mutex<HashMap<String, Vec<Result<QueryOutcome, QueryError>>>>,
    }

    impl ScriptedSource {
        fn new(
            scripts: impl IntoIterator<Item = (&'static str, Vec<Result<QueryOutcome, QueryError>>)>,
        ) -> Self {
            Self {
                scripts: Mutex::new(
                    scripts
                        .into_iter()
                        .map(|(k, mut v)| {
                            v.reverse(); // pop() consumes front-first
                            (k.to_string(), v)
                        })
                        .collect(),
                ),
            }
        }
    }

    impl MetricSource for ScriptedSource {
        async fn query(&self, expr: &str) -> Result<QueryOutcome, QueryError> {
            let mut scripts = self.scripts.lock().unwrap();
            scripts
                .get_mut(expr)
                .and_then(|queue| queue.pop())
                .unwrap_or(Ok(QueryOutcome::Indeterminate))
        }
    }

    fn objective(name: &str, comparison: Comparison, threshold: f64) -> Objective {
        Objective {
            name: name.to_string(),
            query: format!("query_{name}"),
            comparison,
            threshold,
            unit: String::new(),
        }
    }

    #[tokio::test]
    async fn all_passing_objectives_yield_a_pass() {
        let source = ScriptedSource::new([
            ("query_latency", vec![Ok(QueryOutcome::Value(1.2))]),
            ("query_success", vec![Ok(QueryOutcome::Value(100.0))]),
        ]);
        let evaluator = Evaluator::new(source);
        let objectives = vec![
            objective("latency", Comparison::Below, 2.0),
            objective("success", Comparison::Above, 99.9),
        ];

        let verdict = evaluator.evaluate(&objectives).await.unwrap();
        assert!(verdict.pass);
        assert_eq!(verdict.checks.len(), 2);
        assert_eq!(verdict.checks[0].sample.value, Some(1.2));
        assert_eq!(verdict.checks[1].sample.value, Some(100.0));
    }

    #[tokio::test]
    async fn one_breach_fails_the_verdict_but_all_are_reported() {
        let source = ScriptedSource::new([
            ("query_latency", vec![Ok(QueryOutcome::Value(2.5))]),
            ("query_success", vec![Ok(QueryOutcome::Value(100.0))]),
        ]);
        let evaluator = Evaluator::new(source);
        let objectives = vec![
            objective("latency", Comparison::Below, 2.0),
            objective("success", Comparison::Above, 99.9),
        ];

        let verdict = evaluator.evaluate(&objectives).await.unwrap();
        assert!(!verdict.pass);
        // No short-circuit: the passing objective is still in the report.
        assert_eq!(verdict.checks.len(), 2);
        assert_eq!(verdict.failed_objectives(), vec!["latency"]);
        assert!(verdict.checks[1].passed);
    }

    #[tokio::test]
    async fn indeterminate_passes_with_flag() {
        let source = ScriptedSource::new([
            ("query_latency", vec![Ok(QueryOutcome::Indeterminate)]),
        ]);
        let evaluator = Evaluator::new(source);
        let objectives = vec![objective("latency", Comparison::Below, 2.0)];

        let verdict = evaluator.evaluate(&objectives).await.unwrap();
        assert!(verdict.pass);
        assert!(verdict.checks[0].indeterminate);
        assert_eq!(verdict.checks[0].sample.value, None);
    }

    #[tokio::test]
    async fn query_error_aborts_the_whole_evaluation() {
        let source = ScriptedSource::new([
            (
                "query_latency",
                vec![Err(QueryError::BackendUnreachable("down".to_string()))],
            ),
            ("query_success", vec![Ok(QueryOutcome::Value(100.0))]),
        ]);
        let evaluator = Evaluator::new(source);
        let objectives = vec![
            objective("latency", Comparison::Below, 2.0),
            objective("success", Comparison::Above, 99.9),
        ];

        let err = evaluator.evaluate(&objectives).await.unwrap_err();
        assert_eq!(err.objective, "latency");
        assert!(matches!(err.source, QueryError::BackendUnreachable(_)));
    }

    #[tokio::test]
    async fn same_samples_same_verdict() {
        let outcomes = vec![Ok(QueryOutcome::Value(1.5)), Ok(QueryOutcome::Value(1.5))];
        let source = ScriptedSource::new([("query_latency", outcomes)]);
        let evaluator = Evaluator::new(source);
        let objectives = vec![objective("latency", Comparison::Below, 2.0)];

        let first = evaluator.evaluate(&objectives).await.unwrap();
        let second = evaluator.evaluate(&objectives).await.unwrap();
        assert_eq!(first.pass, second.pass);
        assert_eq!(
            first.checks[0].sample.value,
            second.checks[0].sample.value
        );
        assert_eq!(first.checks[0].passed, second.checks[0].passed);
    }
}
