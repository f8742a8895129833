// Pegasus Workflow Backend
// Emits properties, site catalog and workflow YAML, then drives pegasus-plan

use crate::config::BackendSettings;
use crate::runners::{SubmissionError, SubmitOptions, WorkflowBackend, WorkflowHandle};
use crate::workflow::{JobGraph, JobKind, JobNode};

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PEGASUS_VERSION: &str = "5.0";
const PROPERTIES_FILE: &str = "pegasus.properties";
const SITES_FILE: &str = "sites.yml";
const WORKFLOW_FILE: &str = "workflow.yml";

type Profiles = BTreeMap<String, BTreeMap<String, String>>;

/// Submits job graphs through the Pegasus planner
#[derive(Debug, Clone)]
pub struct PegasusBackend {
    settings: BackendSettings,
    /// Root holding `bin/` with the job wrapper scripts
    project_root: PathBuf,
}

/// Files written for one planner invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanFiles {
    pub dir: PathBuf,
    pub properties: PathBuf,
    pub sites: PathBuf,
    pub workflow: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct SiteCatalog {
    pegasus: &'static str,
    sites: Vec<Site>,
}

#[derive(Debug, Serialize)]
struct Site {
    name: String,
    arch: &'static str,
    #[serde(rename = "os.type", skip_serializing_if = "Option::is_none")]
    os_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    directories: Vec<SiteDirectory>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    profiles: Profiles,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SiteDirectory {
    #[serde(rename = "type")]
    kind: &'static str,
    path: String,
    file_servers: Vec<FileServer>,
}

#[derive(Debug, Serialize)]
struct FileServer {
    operation: &'static str,
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    pegasus: &'static str,
    name: String,
    replica_catalog: ReplicaCatalog,
    transformation_catalog: TransformationCatalog,
    jobs: Vec<WorkflowJob>,
    job_dependencies: Vec<JobDependency>,
}

#[derive(Debug, Serialize)]
struct ReplicaCatalog {
    replicas: Vec<Replica>,
}

#[derive(Debug, Serialize)]
struct Replica {
    lfn: String,
    pfns: Vec<Pfn>,
}

#[derive(Debug, Serialize)]
struct Pfn {
    site: &'static str,
    pfn: String,
}

#[derive(Debug, Serialize)]
struct TransformationCatalog {
    transformations: Vec<Transformation>,
}

#[derive(Debug, Serialize)]
struct Transformation {
    name: &'static str,
    sites: Vec<TransformationSite>,
}

#[derive(Debug, Serialize)]
struct TransformationSite {
    name: &'static str,
    pfn: String,
    #[serde(rename = "type")]
    kind: &'static str,
    arch: &'static str,
}

#[derive(Debug, Serialize)]
struct WorkflowJob {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    id: String,
    arguments: Vec<String>,
    uses: Vec<FileUse>,
    profiles: Profiles,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileUse {
    lfn: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage_out: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    register_replica: Option<bool>,
}

#[derive(Debug, Serialize)]
struct JobDependency {
    id: String,
    children: Vec<String>,
}

impl PegasusBackend {
    pub fn new(settings: BackendSettings, project_root: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            project_root: project_root.into(),
        }
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Directory holding the generated files for one workflow
    pub fn workflow_dir(&self, graph: &JobGraph) -> PathBuf {
        self.settings.work_dir.join("workflows").join(&graph.name)
    }

    /// Planner runs directory
    pub fn runs_dir(&self) -> PathBuf {
        self.settings.work_dir.join("runs")
    }

    /// Planner properties in Java properties syntax
    pub fn properties(&self, sites_file: &Path) -> String {
        let entries = [
            ("pegasus.catalog.site.file", sites_file.display().to_string()),
            ("pegasus.monitord.encoding", "json".to_string()),
            ("pegasus.gridstart.arguments", "-f".to_string()),
            ("pegasus.register", "off".to_string()),
            (
                "dagman.stageout.maxjobs",
                self.settings.stageout_max_jobs.to_string(),
            ),
            ("dagman.retry", self.settings.retries.to_string()),
        ];
        entries
            .iter()
            .map(|(key, value)| format!("{} = {}\n", key, value))
            .collect()
    }

    /// Site catalog with the submit node, the execution pool and the storage server
    pub fn site_catalog(&self, graph: &JobGraph) -> SiteCatalog {
        let scratch = self.settings.work_dir.join("scratch");
        let scratch = scratch.display().to_string();

        let mut local_profiles = Profiles::new();
        if let Ok(path) = std::env::var("PATH") {
            local_profiles
                .entry("env".to_string())
                .or_default()
                .insert("PATH".to_string(), path);
        }
        if let Some(key) = &self.settings.ssh_private_key {
            local_profiles
                .entry("pegasus".to_string())
                .or_default()
                .insert("SSH_PRIVATE_KEY".to_string(), key.display().to_string());
        }

        let local = Site {
            name: "local".to_string(),
            arch: "x86_64",
            os_type: None,
            directories: vec![SiteDirectory {
                kind: "sharedScratch",
                file_servers: vec![FileServer {
                    operation: "all",
                    url: format!("file://{}", scratch),
                }],
                path: scratch,
            }],
            profiles: local_profiles,
        };

        let resources = &self.settings.resources;
        let mut pool_profiles = Profiles::new();
        pool_profiles.insert(
            "pegasus".to_string(),
            BTreeMap::from([("style".to_string(), "condor".to_string())]),
        );
        pool_profiles.insert(
            "condor".to_string(),
            BTreeMap::from([
                ("universe".to_string(), "vanilla".to_string()),
                ("requirements".to_string(), resources.requirements.clone()),
                ("request_cpus".to_string(), resources.request_cpus.to_string()),
                ("request_memory".to_string(), resources.request_memory.clone()),
                ("request_disk".to_string(), resources.request_disk.clone()),
            ]),
        );

        let condorpool = Site {
            name: "condorpool".to_string(),
            arch: "x86_64",
            os_type: Some("linux"),
            directories: Vec::new(),
            profiles: pool_profiles,
        };

        let remote = &self.settings.remote;
        let storage_path = format!(
            "{}/{}",
            remote.base_path.trim_end_matches('/'),
            graph.output_subdir
        );
        let remote_site = Site {
            name: "remote".to_string(),
            arch: "x86_64",
            os_type: Some("linux"),
            directories: vec![SiteDirectory {
                kind: "localStorage",
                file_servers: vec![FileServer {
                    operation: "all",
                    url: format!("scp://{}@{}{}", remote.user, remote.host, storage_path),
                }],
                path: storage_path,
            }],
            profiles: Profiles::new(),
        };

        SiteCatalog {
            pegasus: PEGASUS_VERSION,
            sites: vec![local, condorpool, remote_site],
        }
    }

    /// Workflow with inline transformation and replica catalogs
    pub fn workflow_document(&self, graph: &JobGraph) -> Result<WorkflowDocument, SubmissionError> {
        let edges = graph.edges().map_err(|e| SubmissionError::Rejected {
            workflow: graph.name.clone(),
            message: e.to_string(),
        })?;

        let replicas = graph
            .replicas
            .files()
            .into_iter()
            .map(|file| Replica {
                pfns: vec![Pfn {
                    site: "local",
                    pfn: graph.replicas.pfn(&file).display().to_string(),
                }],
                lfn: file.lfn().to_string(),
            })
            .collect();

        let transformations = [
            (JobKind::Simulation, "run_simulation.sh"),
            (JobKind::Processing, "sort_and_fit_simulation_output.sh"),
            (JobKind::Merge, "merge.sh"),
        ]
        .into_iter()
        .map(|(kind, script)| Transformation {
            name: kind.transformation(),
            sites: vec![TransformationSite {
                name: "local",
                pfn: self.project_root.join("bin").join(script).display().to_string(),
                kind: "stageable",
                arch: "x86_64",
            }],
        })
        .collect();

        let jobs = graph
            .nodes()
            .into_iter()
            .map(|node| self.workflow_job(node))
            .collect();

        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (parent, child) in edges {
            children.entry(parent).or_default().push(child);
        }
        let job_dependencies = children
            .into_iter()
            .map(|(id, children)| JobDependency { id, children })
            .collect();

        Ok(WorkflowDocument {
            pegasus: PEGASUS_VERSION,
            name: graph.name.clone(),
            replica_catalog: ReplicaCatalog { replicas },
            transformation_catalog: TransformationCatalog { transformations },
            jobs,
            job_dependencies,
        })
    }

    fn workflow_job(&self, node: JobNode<'_>) -> WorkflowJob {
        // Only merged archives leave the execution site
        let stage_out = node.kind == JobKind::Merge;

        let uses = node
            .inputs
            .iter()
            .map(|file| FileUse {
                lfn: file.lfn().to_string(),
                kind: "input",
                stage_out: None,
                register_replica: None,
            })
            .chain(node.outputs.iter().map(|file| FileUse {
                lfn: file.lfn().to_string(),
                kind: "output",
                stage_out: Some(stage_out),
                register_replica: Some(false),
            }))
            .collect();

        let image = match node.kind {
            JobKind::Simulation => &self.settings.images.simulation,
            JobKind::Processing => &self.settings.images.processing,
            JobKind::Merge => &self.settings.images.merge,
        };
        let mut profiles = Profiles::new();
        profiles.insert(
            "condor".to_string(),
            BTreeMap::from([("+SingularityImage".to_string(), format!("\"{}\"", image))]),
        );

        WorkflowJob {
            kind: "job",
            name: node.kind.transformation(),
            id: node.id.to_string(),
            arguments: node.arguments,
            uses,
            profiles,
        }
    }

    /// Write properties, site catalog and workflow for one graph
    pub async fn write_plan_files(&self, graph: &JobGraph) -> Result<PlanFiles, SubmissionError> {
        let dir = self.workflow_dir(graph);
        tokio::fs::create_dir_all(&dir).await?;

        let files = PlanFiles {
            properties: dir.join(PROPERTIES_FILE),
            sites: dir.join(SITES_FILE),
            workflow: dir.join(WORKFLOW_FILE),
            dir,
        };

        let sites = serde_yaml::to_string(&self.site_catalog(graph))?;
        let workflow = serde_yaml::to_string(&self.workflow_document(graph)?)?;

        tokio::fs::write(&files.properties, self.properties(&files.sites)).await?;
        tokio::fs::write(&files.sites, sites).await?;
        tokio::fs::write(&files.workflow, workflow).await?;

        debug!(dir = %files.dir.display(), "Wrote planner inputs");
        Ok(files)
    }

    /// Planner arguments; never passed through a shell
    pub fn planner_args(&self, files: &PlanFiles, options: &SubmitOptions) -> Vec<String> {
        let mut args = vec![
            "--conf".to_string(),
            files.properties.display().to_string(),
            "--dir".to_string(),
            self.runs_dir().display().to_string(),
            "--sites".to_string(),
            options.sites.join(","),
            "--output-sites".to_string(),
            options.output_sites.join(","),
            "--verbose".to_string(),
        ];
        if options.submit {
            args.push("--submit".to_string());
        }
        args.push(files.workflow.display().to_string());
        args
    }
}

/// Extract the submit directory from planner output.
///
/// The planner ends with hints such as `pegasus-run  /path/to/run0001`
/// or `pegasus-status -l /path/to/run0001`.
pub fn parse_submit_dir(output: &str) -> Option<PathBuf> {
    output.lines().find_map(|line| {
        let line = line.trim();
        if !(line.starts_with("pegasus-run") || line.starts_with("pegasus-status")) {
            return None;
        }
        line.split_whitespace()
            .rev()
            .find(|token| token.starts_with('/'))
            .map(PathBuf::from)
    })
}

#[async_trait::async_trait]
impl WorkflowBackend for PegasusBackend {
    async fn submit(
        &self,
        graph: &JobGraph,
        options: &SubmitOptions,
    ) -> Result<WorkflowHandle, SubmissionError> {
        if options.output_sites.iter().any(|s| s == "remote") && !self.settings.remote.is_configured()
        {
            return Err(SubmissionError::Rejected {
                workflow: graph.name.clone(),
                message: "remote storage host, user and base_path are not configured".to_string(),
            });
        }

        let planner = which::which(&self.settings.planner)
            .map_err(|_| SubmissionError::PlannerNotFound(self.settings.planner.clone()))?;

        let files = self.write_plan_files(graph).await?;
        tokio::fs::create_dir_all(self.runs_dir()).await?;

        let args = self.planner_args(&files, options);
        info!(workflow = %graph.name, planner = %planner.display(), "Planning workflow");

        let output = tokio::process::Command::new(&planner)
            .args(&args)
            .current_dir(&files.dir)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            return Err(SubmissionError::PlannerFailed {
                code: output.status.code(),
                stderr: detail.to_string(),
            });
        }

        let submit_dir = parse_submit_dir(&stdout).or_else(|| parse_submit_dir(&stderr));
        debug!(workflow = %graph.name, submit_dir = ?submit_dir, "Planner finished");

        Ok(WorkflowHandle {
            workflow: graph.name.clone(),
            submit_dir,
            submitted: options.submit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteStorage;
    use crate::params::{DecayMode, ParameterSet};
    use crate::workflow::{GraphBuilder, InputCatalog, Variant, PROCESSING_SUPPORT_FILES};

    fn settings(work_dir: &Path) -> BackendSettings {
        BackendSettings {
            work_dir: work_dir.to_path_buf(),
            remote: RemoteStorage {
                host: "storage.example.org".to_string(),
                user: "sim".to_string(),
                base_path: "/data/ggac/".to_string(),
            },
            ..Default::default()
        }
    }

    fn graph() -> JobGraph {
        let params = ParameterSet {
            sequence_number: 0,
            element: "50".to_string(),
            isotope: "132".to_string(),
            decay_mode: DecayMode::BetaMinus,
            gamma1: "100".to_string(),
            gamma2: "200".to_string(),
            radius: "70".to_string(),
            total_events: 2000,
            batch_events: 1000,
            iterations: 1,
        };
        let files = Variant::ALL
            .iter()
            .map(|v| v.run_macro())
            .chain(PROCESSING_SUPPORT_FILES.iter().map(|s| s.to_string()));
        let catalog = InputCatalog::from_files("/srv/inputs/z50.a132.e100_200", files);
        GraphBuilder::default().build(&params, 0, &catalog).unwrap()
    }

    #[test]
    fn test_parse_submit_dir() {
        let output = "\
2024.01.01 12:00:00.000 UTC: Submitting to condor ggac-0.dag.condor.sub
2024.01.01 12:00:01.000 UTC:
2024.01.01 12:00:01.000 UTC: Your workflow has been started and is running in the base directory:
2024.01.01 12:00:01.000 UTC:
2024.01.01 12:00:01.000 UTC:   /home/sim/runs/sim/pegasus/ggac/run0001
 pegasus-status -l /home/sim/runs/sim/pegasus/ggac/run0001
";
        assert_eq!(
            parse_submit_dir(output),
            Some(PathBuf::from("/home/sim/runs/sim/pegasus/ggac/run0001"))
        );

        let planned = "  pegasus-run  /work/runs/run0002\n";
        assert_eq!(parse_submit_dir(planned), Some(PathBuf::from("/work/runs/run0002")));
        assert_eq!(parse_submit_dir("nothing useful"), None);
    }

    #[test]
    fn test_properties() {
        let backend = PegasusBackend::new(settings(Path::new("/work")), "/project");
        let props = backend.properties(Path::new("/work/workflows/x/sites.yml"));
        assert!(props.contains("pegasus.catalog.site.file = /work/workflows/x/sites.yml\n"));
        assert!(props.contains("dagman.retry = 3\n"));
        assert!(props.contains("dagman.stageout.maxjobs = 10\n"));
        assert!(props.contains("pegasus.register = off\n"));
    }

    #[test]
    fn test_site_catalog_remote_path() {
        let backend = PegasusBackend::new(settings(Path::new("/work")), "/project");
        let yaml = serde_yaml::to_string(&backend.site_catalog(&graph())).unwrap();
        assert!(yaml.contains("url: scp://sim@storage.example.org/data/ggac/z50.a132/100-200"));
        assert!(yaml.contains("url: file:///work/scratch"));
        assert!(yaml.contains("os.type: linux"));
        assert!(yaml.contains("style: condor"));
    }

    #[test]
    fn test_workflow_document() {
        let backend = PegasusBackend::new(settings(Path::new("/work")), "/project");
        let graph = graph();
        let doc = backend.workflow_document(&graph).unwrap();

        assert_eq!(doc.jobs.len(), graph.job_total());
        assert_eq!(doc.replica_catalog.replicas.len(), 6);
        assert_eq!(doc.transformation_catalog.transformations.len(), 3);

        let first = &doc.jobs[0];
        assert_eq!(first.name, "simulation");
        assert_eq!(first.id, "simulation_z0_0000");
        let image = &first.profiles["condor"]["+SingularityImage"];
        assert!(image.starts_with('"') && image.contains("griffin_simulation"));

        let sim_output = first.uses.iter().find(|u| u.kind == "output").unwrap();
        assert_eq!(sim_output.stage_out, Some(false));

        let merge = doc.jobs.iter().find(|j| j.name == "merge").unwrap();
        let archive = merge.uses.iter().find(|u| u.kind == "output").unwrap();
        assert_eq!(archive.stage_out, Some(true));

        let sim_deps = doc
            .job_dependencies
            .iter()
            .find(|d| d.id == "simulation_z0_0000")
            .unwrap();
        assert_eq!(sim_deps.children.len(), 1);
        assert!(sim_deps.children[0].starts_with("data_processing"));

        let yaml = serde_yaml::to_string(&doc).unwrap();
        assert!(yaml.contains("pegasus: '5.0'") || yaml.contains("pegasus: \"5.0\""));
        assert!(yaml.contains("jobDependencies:"));
        assert!(yaml.contains("stageOut: false"));
        assert!(yaml.contains("/project/bin/run_simulation.sh"));
    }

    #[test]
    fn test_planner_args() {
        let backend = PegasusBackend::new(settings(Path::new("/work")), "/project");
        let files = PlanFiles {
            dir: PathBuf::from("/work/workflows/w"),
            properties: PathBuf::from("/work/workflows/w/pegasus.properties"),
            sites: PathBuf::from("/work/workflows/w/sites.yml"),
            workflow: PathBuf::from("/work/workflows/w/workflow.yml"),
        };

        let args = backend.planner_args(&files, &SubmitOptions::default());
        assert_eq!(args[0], "--conf");
        assert!(args.contains(&"--submit".to_string()));
        assert_eq!(args.last().unwrap(), "/work/workflows/w/workflow.yml");

        let plan_only = SubmitOptions {
            submit: false,
            ..Default::default()
        };
        assert!(!backend
            .planner_args(&files, &plan_only)
            .contains(&"--submit".to_string()));
    }

    #[tokio::test]
    async fn test_write_plan_files() {
        let temp = tempfile::tempdir().unwrap();
        let backend = PegasusBackend::new(settings(temp.path()), "/project");
        let files = backend.write_plan_files(&graph()).await.unwrap();

        assert!(files.dir.ends_with("workflows/ggac-z50.a132-100_200-i0"));
        assert!(files.properties.is_file());
        assert!(files.sites.is_file());
        let workflow = std::fs::read_to_string(&files.workflow).unwrap();
        assert!(workflow.contains("name: ggac-z50.a132-100_200-i0"));
    }

    #[tokio::test]
    async fn test_submit_without_remote_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let mut cfg = settings(temp.path());
        cfg.remote = RemoteStorage::default();
        let backend = PegasusBackend::new(cfg, "/project");

        let err = backend
            .submit(&graph(), &SubmitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_submit_missing_planner() {
        let temp = tempfile::tempdir().unwrap();
        let mut cfg = settings(temp.path());
        cfg.planner = "definitely-not-a-real-planner-binary".to_string();
        let backend = PegasusBackend::new(cfg, "/project");

        let err = backend
            .submit(&graph(), &SubmitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::PlannerNotFound(_)));
    }
}
