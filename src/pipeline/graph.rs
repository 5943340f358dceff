//! # Task Graph
//!
//! Grafo statico degli stage di una composizione ed executor fan-out/join.
//!
//! ## Struttura:
//! - Nodi = stage, archi = vincoli di ordinamento (`after`)
//! - Un nodo può dipendere solo da nodi già dichiarati ⇒ grafo aciclico per costruzione
//! - Ogni stage compare al massimo una volta
//!
//! ## Esecuzione:
//! 1. Avvia tutti i nodi le cui dipendenze sono completate
//! 2. Attende il primo stage che termina (`FuturesUnordered`, un solo task)
//! 3. Successo ⇒ sblocca i dipendenti; errore ⇒ nessun nuovo avvio e la
//!    composizione è riportata fallita subito
//!
//! Gli stage ancora in volo al primo errore non vengono segnalati: vengono
//! abbandonati al ritorno dell'executor.
//!
//! ## Composizioni:
//! ```text
//! build:    cleanDist → (htmlMin | cssMin | jsMin | buildOther | imagesMin) → zipArchive
//! default:  styles | scripts | browsersync | watching
//! ```

use crate::error::PipelineError;
use crate::pipeline::progress_tracker::Reporter;
use crate::pipeline::stage::{StageId, StageReport, StageRunner};
use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskNode {
    stage: StageId,
    after: Vec<usize>,
}

/// Immutable stage dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskGraph {
    name: String,
    nodes: Vec<TaskNode>,
}

/// Builds a [`TaskGraph`], rejecting forward references and duplicates
pub struct TaskGraphBuilder {
    name: String,
    nodes: Vec<TaskNode>,
}

impl TaskGraphBuilder {
    /// Add `stage`, runnable once every stage in `after` has completed
    pub fn stage(mut self, stage: StageId, after: &[StageId]) -> Result<Self> {
        if self.index_of(stage).is_some() {
            return Err(PipelineError::Validation(format!("stage '{}' declared twice in '{}'", stage, self.name)).into());
        }

        let mut deps = Vec::with_capacity(after.len());
        for dep in after {
            let index = self.index_of(*dep).ok_or_else(|| {
                PipelineError::Validation(format!(
                    "stage '{}' depends on '{}' which is not declared before it",
                    stage, dep
                ))
            })?;
            deps.push(index);
        }

        self.nodes.push(TaskNode { stage, after: deps });
        Ok(self)
    }

    /// Add every stage in `stages`, each depending on all of `after`
    pub fn parallel(self, stages: &[StageId], after: &[StageId]) -> Result<Self> {
        stages.iter().try_fold(self, |builder, stage| builder.stage(*stage, after))
    }

    pub fn build(self) -> Result<TaskGraph> {
        if self.nodes.is_empty() {
            return Err(PipelineError::Validation(format!("composition '{}' has no stages", self.name)).into());
        }
        Ok(TaskGraph {
            name: self.name,
            nodes: self.nodes,
        })
    }

    fn index_of(&self, stage: StageId) -> Option<usize> {
        self.nodes.iter().position(|node| node.stage == stage)
    }
}

const BUILD_STAGES: [StageId; 5] = [
    StageId::HtmlMin,
    StageId::CssMin,
    StageId::JsMin,
    StageId::BuildOther,
    StageId::ImagesMin,
];

impl TaskGraph {
    pub fn builder(name: impl Into<String>) -> TaskGraphBuilder {
        TaskGraphBuilder {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// One-shot release build
    pub fn release() -> Result<Self> {
        Self::builder("build")
            .stage(StageId::CleanDist, &[])?
            .parallel(&BUILD_STAGES, &[StageId::CleanDist])?
            .stage(StageId::ZipArchive, &BUILD_STAGES)?
            .build()
    }

    /// Long-lived development session
    pub fn development() -> Result<Self> {
        Self::builder("default")
            .parallel(
                &[StageId::Styles, StageId::Scripts, StageId::Browsersync, StageId::Watching],
                &[],
            )?
            .build()
    }

    /// A single stage invoked by name
    pub fn single(stage: StageId) -> Result<Self> {
        Self::builder(stage.name()).stage(stage, &[])?.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in declaration order
    pub fn stages(&self) -> Vec<StageId> {
        self.nodes.iter().map(|node| node.stage).collect()
    }

    /// Direct predecessors of `stage`
    pub fn dependencies(&self, stage: StageId) -> Vec<StageId> {
        self.nodes
            .iter()
            .find(|node| node.stage == stage)
            .map(|node| node.after.iter().map(|&i| self.nodes[i].stage).collect())
            .unwrap_or_default()
    }

    /// Run the graph to completion. Returns the reports in completion order,
    /// or the first stage error.
    pub async fn execute(&self, runner: &dyn StageRunner, reporter: &Reporter) -> Result<Vec<StageReport>> {
        let started = Instant::now();
        reporter.composition_start(&self.name, &self.stages());

        let result = self.drive(runner, reporter).await;
        match &result {
            Ok(reports) => reporter.composition_complete(&self.name, reports.len(), started.elapsed(), None),
            Err((completed, e)) => reporter.composition_complete(&self.name, *completed, started.elapsed(), Some(e)),
        }
        result.map_err(|(_, e)| e)
    }

    async fn drive(
        &self,
        runner: &dyn StageRunner,
        reporter: &Reporter,
    ) -> std::result::Result<Vec<StageReport>, (usize, anyhow::Error)> {
        let mut started = vec![false; self.nodes.len()];
        let mut done = vec![false; self.nodes.len()];
        let mut reports = Vec::with_capacity(self.nodes.len());
        let mut in_flight = FuturesUnordered::new();

        loop {
            for (index, node) in self.nodes.iter().enumerate() {
                if started[index] || !node.after.iter().all(|&dep| done[dep]) {
                    continue;
                }
                started[index] = true;
                reporter.stage_start(node.stage);

                let stage = node.stage;
                in_flight.push(async move {
                    let stage_started = Instant::now();
                    let result = runner.run_stage(stage).await;
                    (index, result.map(|report| report.with_duration(stage_started.elapsed())))
                });
            }

            let Some((index, result)) = in_flight.next().await else {
                break;
            };
            let stage = self.nodes[index].stage;

            match result {
                Ok(report) => {
                    reporter.stage_complete(&report);
                    done[index] = true;
                    reports.push(report);
                }
                Err(e) => {
                    reporter.stage_failed(stage, &e);
                    let e = e.context(format!("Stage '{}' failed in '{}'", stage, self.name));
                    return Err((reports.len(), e));
                }
            }
        }

        Ok(reports)
    }
}

/// Run `graph` and attach the composition name to any error
pub async fn run_composition(graph: &TaskGraph, runner: &dyn StageRunner, reporter: &Reporter) -> Result<Vec<StageReport>> {
    graph
        .execute(runner, reporter)
        .await
        .with_context(|| format!("Composition '{}' failed", graph.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records start/finish order, fails and hangs on demand
    #[derive(Default)]
    struct MockRunner {
        events: Mutex<Vec<String>>,
        failing: HashSet<StageId>,
        hanging: HashSet<StageId>,
    }

    impl MockRunner {
        fn failing(stages: &[StageId]) -> Self {
            Self {
                failing: stages.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn position(&self, event: &str) -> usize {
            self.events()
                .iter()
                .position(|e| e == event)
                .unwrap_or_else(|| panic!("missing event {}", event))
        }
    }

    impl StageRunner for MockRunner {
        fn run_stage(&self, stage: StageId) -> BoxFuture<'_, Result<StageReport>> {
            Box::pin(async move {
                self.events.lock().unwrap().push(format!("start:{}", stage));
                if self.hanging.contains(&stage) {
                    futures::future::pending::<()>().await;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                if self.failing.contains(&stage) {
                    return Err(anyhow::anyhow!("{} exploded", stage));
                }
                self.events.lock().unwrap().push(format!("end:{}", stage));
                Ok(StageReport::new(stage, 1, "ok"))
            })
        }
    }

    #[test]
    fn test_release_graph_shape() {
        let graph = TaskGraph::release().unwrap();
        assert_eq!(graph.name(), "build");
        assert_eq!(graph.stages().first(), Some(&StageId::CleanDist));
        assert_eq!(graph.stages().last(), Some(&StageId::ZipArchive));
        assert_eq!(graph.dependencies(StageId::ImagesMin), vec![StageId::CleanDist]);
        assert_eq!(graph.dependencies(StageId::ZipArchive).len(), 5);
    }

    #[test]
    fn test_development_graph_has_four_roots() {
        let graph = TaskGraph::development().unwrap();
        assert_eq!(graph.stages().len(), 4);
        assert!(graph.stages().iter().all(|s| graph.dependencies(*s).is_empty()));
    }

    #[test]
    fn test_builder_rejects_forward_references_and_duplicates() {
        assert!(TaskGraph::builder("bad").stage(StageId::ZipArchive, &[StageId::CleanDist]).is_err());
        assert!(TaskGraph::builder("dup")
            .stage(StageId::Styles, &[])
            .unwrap()
            .stage(StageId::Styles, &[])
            .is_err());
        assert!(TaskGraph::builder("empty").build().is_err());
    }

    #[tokio::test]
    async fn test_release_respects_ordering() {
        let runner = MockRunner::default();
        let graph = TaskGraph::release().unwrap();
        let reports = graph.execute(&runner, &Reporter::default()).await.unwrap();

        assert_eq!(reports.len(), 7);
        let clean_end = runner.position("end:cleanDist");
        let zip_start = runner.position("start:zipArchive");
        for stage in BUILD_STAGES {
            assert!(runner.position(&format!("start:{}", stage)) > clean_end);
            assert!(runner.position(&format!("end:{}", stage)) < zip_start);
        }
    }

    #[tokio::test]
    async fn test_parallel_stages_overlap() {
        let runner = MockRunner::default();
        TaskGraph::release().unwrap().execute(&runner, &Reporter::default()).await.unwrap();

        // All five start before any of them ends
        let first_end = BUILD_STAGES
            .iter()
            .map(|s| runner.position(&format!("end:{}", s)))
            .min()
            .unwrap();
        for stage in BUILD_STAGES {
            assert!(runner.position(&format!("start:{}", stage)) < first_end);
        }
    }

    #[tokio::test]
    async fn test_failure_stops_dependents() {
        let runner = MockRunner::failing(&[StageId::CssMin]);
        let err = TaskGraph::release()
            .unwrap()
            .execute(&runner, &Reporter::default())
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("cssMin exploded"));
        assert!(!runner.events().contains(&"start:zipArchive".to_string()));
    }

    #[tokio::test]
    async fn test_failure_at_root_starts_nothing_else() {
        let runner = MockRunner::failing(&[StageId::CleanDist]);
        assert!(TaskGraph::release()
            .unwrap()
            .execute(&runner, &Reporter::default())
            .await
            .is_err());
        assert_eq!(runner.events(), vec!["start:cleanDist".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_is_reported_while_long_running_siblings_continue() {
        let runner = MockRunner {
            failing: [StageId::Styles].into_iter().collect(),
            hanging: [StageId::Browsersync, StageId::Watching].into_iter().collect(),
            ..MockRunner::default()
        };
        let graph = TaskGraph::development().unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), graph.execute(&runner, &Reporter::default()))
            .await
            .expect("composition must report failure without waiting for the server");
        assert!(result.is_err());
    }
}
