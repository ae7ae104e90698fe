//! DAG resolution (§4.2, §9): jobs refer to each other by name within a
//! pipeline; an explicit name→job map and name→dependents adjacency list
//! are built locally, never persisted as a graph.

use crate::error::OrchestratorError;
use lattice_domain::PipelineJob;
use std::collections::{HashMap, HashSet, VecDeque};

/// An execution plan: a sequence of levels, each a list of job names, such
/// that every job appears in exactly one level and every dependency of a
/// job appears in a strictly earlier level.
pub type ExecutionLevels = Vec<Vec<String>>;

/// Resolve `jobs` into levels via Kahn's algorithm. Each level is maximal
/// among orderings preserving the dependency constraint — every job whose
/// dependencies are all already placed joins the next level, all at once.
pub fn resolve_execution_order(jobs: &[PipelineJob]) -> Result<ExecutionLevels, OrchestratorError> {
    let by_name: HashMap<&str, &PipelineJob> = jobs.iter().map(|j| (j.name.as_str(), j)).collect();

    for job in jobs {
        if job.depends_on.contains(&job.name) {
            return Err(OrchestratorError::SelfDependency(job.name.clone()));
        }
        for dep in &job.depends_on {
            if !by_name.contains_key(dep.as_str()) {
                return Err(OrchestratorError::UnknownDependency {
                    job: job.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut remaining_deps: HashMap<&str, HashSet<&str>> = jobs
        .iter()
        .map(|j| (j.name.as_str(), j.depends_on.iter().map(String::as_str).collect()))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for job in jobs {
        for dep in &job.depends_on {
            dependents.entry(dep.as_str()).or_default().push(job.name.as_str());
        }
    }

    let mut levels = ExecutionLevels::new();
    let mut placed = 0usize;
    let mut ready: VecDeque<&str> = remaining_deps
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(name, _)| *name)
        .collect();

    while !ready.is_empty() {
        let this_level: Vec<&str> = ready.drain(..).collect();
        placed += this_level.len();
        for name in &this_level {
            if let Some(next_jobs) = dependents.get(name) {
                for next in next_jobs {
                    let deps = remaining_deps.get_mut(next).expect("job present in remaining_deps");
                    deps.remove(name);
                    if deps.is_empty() {
                        ready.push_back(next);
                    }
                }
            }
        }
        let mut sorted_level: Vec<String> = this_level.into_iter().map(String::from).collect();
        sorted_level.sort();
        levels.push(sorted_level);
    }

    if placed != jobs.len() {
        return Err(OrchestratorError::CycleDetected);
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_ids::{NotebookId, PipelineId};

    fn job(pipeline: &PipelineId, name: &str, deps: &[&str]) -> PipelineJob {
        PipelineJob::new(pipeline.clone(), name, NotebookId::new(), 0).depends_on(deps.to_vec())
    }

    #[test]
    fn resolves_diamond_dependency() {
        let pipeline = PipelineId::new();
        let jobs = vec![
            job(&pipeline, "extract", &[]),
            job(&pipeline, "transform_a", &["extract"]),
            job(&pipeline, "transform_b", &["extract"]),
            job(&pipeline, "load", &["transform_a", "transform_b"]),
        ];
        let levels = resolve_execution_order(&jobs).unwrap();
        assert_eq!(
            levels,
            vec![
                vec!["extract".to_string()],
                vec!["transform_a".to_string(), "transform_b".to_string()],
                vec!["load".to_string()],
            ]
        );
    }

    #[test]
    fn detects_cycle() {
        let pipeline = PipelineId::new();
        let jobs = vec![job(&pipeline, "a", &["b"]), job(&pipeline, "b", &["a"])];
        let err = resolve_execution_order(&jobs).unwrap_err();
        assert!(matches!(err, OrchestratorError::CycleDetected));
    }

    #[test]
    fn detects_self_dependency() {
        let pipeline = PipelineId::new();
        let jobs = vec![job(&pipeline, "a", &["a"])];
        let err = resolve_execution_order(&jobs).unwrap_err();
        assert!(matches!(err, OrchestratorError::SelfDependency(_)));
    }

    #[test]
    fn detects_unknown_dependency() {
        let pipeline = PipelineId::new();
        let jobs = vec![job(&pipeline, "load", &["extract"])];
        let err = resolve_execution_order(&jobs).unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownDependency { .. }));
    }

    #[test]
    fn single_job_is_one_level() {
        let pipeline = PipelineId::new();
        let jobs = vec![job(&pipeline, "only", &[])];
        let levels = resolve_execution_order(&jobs).unwrap();
        assert_eq!(levels, vec![vec!["only".to_string()]]);
    }
}
