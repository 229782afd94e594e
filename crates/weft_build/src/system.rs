//! The system pipeline: `generate → compile → package`.
//!
//! A [`System`] owns a module library, the top-level module name, a backend
//! preset and an output directory. Each stage runs once, in order; any error,
//! including a stage invoked out of order, is reported to the system's
//! [`DiagnosticSink`] and leaves the system [`Failed`](Stage::Failed). While
//! the pipeline runs, a lock file in the output directory keeps other systems
//! from writing to it.

use crate::arbitration::ArbitrationPolicy;
use crate::backend::{backend_for, Backend};
use crate::compile::{compile, CompiledDesign};
use crate::errors::BuildError;
use crate::generate::generate;
use crate::library::Library;
use crate::package::PackageReport;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use weft_common::Interner;
use weft_config::{Arbitration, BackendPreset};
use weft_diagnostics::{Diagnostic, DiagnosticSink};
use weft_ir::HwGraph;

/// Name of the lock file created in the output directory.
pub const LOCK_FILE: &str = ".weft.lock";

/// Where a system is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Created, nothing run yet.
    Constructed,
    /// Every construction function has run.
    Generated,
    /// Validated, resolved and lowered.
    Compiled,
    /// Artifacts written.
    Packaged,
    /// A stage failed; terminal.
    Failed,
}

impl Stage {
    /// Returns the lowercase stage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Constructed => "constructed",
            Stage::Generated => "generated",
            Stage::Compiled => "compiled",
            Stage::Packaged => "packaged",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exclusive claim on an output directory, released on drop.
#[derive(Debug)]
struct OutputLock {
    path: PathBuf,
}

impl OutputLock {
    fn acquire(output_dir: &Path) -> Result<Self, BuildError> {
        fs::create_dir_all(output_dir).map_err(|e| BuildError::io(output_dir, e))?;
        let path = output_dir.join(LOCK_FILE);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(BuildError::OutputLocked { path })
            }
            Err(e) => Err(BuildError::io(&path, e)),
        }
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// A hardware system and its build pipeline.
pub struct System {
    name: String,
    version: String,
    library: Library,
    top: String,
    backend: Box<dyn Backend>,
    arbitration: Arbitration,
    output_dir: PathBuf,
    interner: Interner,
    sink: DiagnosticSink,
    stage: Stage,
    graph: Option<HwGraph>,
    compiled: Option<CompiledDesign>,
    report: Option<PackageReport>,
    lock: Option<OutputLock>,
}

impl System {
    /// Creates a system that builds `top` from `library` with the given
    /// backend preset into `output_dir`.
    pub fn new(
        name: impl Into<String>,
        library: Library,
        top: impl Into<String>,
        preset: BackendPreset,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::with_backend(name, library, top, backend_for(preset), output_dir)
    }

    /// Creates a system with a custom backend implementation.
    pub fn with_backend(
        name: impl Into<String>,
        library: Library,
        top: impl Into<String>,
        backend: Box<dyn Backend>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: "0.0.0".to_string(),
            library,
            top: top.into(),
            arbitration: backend.default_arbitration(),
            backend,
            output_dir: output_dir.into(),
            interner: Interner::new(),
            sink: DiagnosticSink::new(),
            stage: Stage::Constructed,
            graph: None,
            compiled: None,
            report: None,
            lock: None,
        }
    }

    /// Sets the version recorded in the manifest.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Overrides the backend's default arbitration policy; `None` keeps it.
    pub fn with_arbitration(mut self, arbitration: Option<Arbitration>) -> Self {
        if let Some(arbitration) = arbitration {
            self.arbitration = arbitration;
        }
        self
    }

    /// Runs every construction function and materializes the instance tree.
    pub fn generate(&mut self) -> Result<&HwGraph, BuildError> {
        self.enter("generate", Stage::Constructed)?;
        tracing::info!(system = %self.name, top = %self.top, backend = %self.backend.preset(), "generating");

        let result = OutputLock::acquire(&self.output_dir).and_then(|lock| {
            self.lock = Some(lock);
            generate(
                &self.library,
                &self.interner,
                &self.top,
                self.backend.preset(),
                self.backend.capabilities(),
            )
        });
        let graph = self.settle(result, Stage::Generated)?;
        Ok(self.graph.insert(graph))
    }

    /// Validates the graph, resolves services and lowers through the backend.
    pub fn compile(&mut self) -> Result<&CompiledDesign, BuildError> {
        self.enter("compile", Stage::Generated)?;
        tracing::info!(system = %self.name, arbitration = %self.arbitration, "compiling");

        let result = match self.graph.take() {
            Some(graph) => compile(
                &self.name,
                &self.version,
                graph,
                &self.interner,
                self.backend.as_ref(),
                self.arbitration,
                &self.sink,
            ),
            None => Err(weft_common::InternalError::new("generated system has no graph").into()),
        };
        let compiled = self.settle(result, Stage::Compiled)?;
        Ok(self.compiled.insert(compiled))
    }

    /// Writes the compiled artifacts into the output directory.
    pub fn package(&mut self) -> Result<&PackageReport, BuildError> {
        self.enter("package", Stage::Compiled)?;
        tracing::info!(system = %self.name, output = %self.output_dir.display(), "packaging");

        let result = match &self.compiled {
            Some(compiled) => {
                self.backend
                    .package(&self.name, &compiled.artifacts, &self.output_dir)
            }
            None => Err(weft_common::InternalError::new("compiled system has no design").into()),
        };
        let report = self.settle(result, Stage::Packaged)?;
        self.lock = None;
        Ok(self.report.insert(report))
    }

    /// Runs all three stages.
    pub fn build(&mut self) -> Result<&PackageReport, BuildError> {
        self.generate()?;
        self.compile()?;
        self.package()
    }

    fn enter(&mut self, operation: &'static str, expected: Stage) -> Result<(), BuildError> {
        let err = match self.stage {
            stage if stage == expected => return Ok(()),
            Stage::Failed => BuildError::PreviouslyFailed { operation },
            stage => BuildError::OutOfSequence {
                operation,
                stage,
                expected,
            },
        };
        self.settle(Err(err), Stage::Failed)
    }

    fn settle<T>(&mut self, result: Result<T, BuildError>, next: Stage) -> Result<T, BuildError> {
        match result {
            Ok(value) => {
                tracing::debug!(stage = %next, "stage complete");
                self.stage = next;
                Ok(value)
            }
            Err(err) => {
                tracing::error!(code = %err.code(), "{err}");
                self.sink.emit(err.to_diagnostic());
                self.stage = Stage::Failed;
                self.lock = None;
                Err(err)
            }
        }
    }

    /// Returns the current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns the system name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the system version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the top-level module name.
    pub fn top(&self) -> &str {
        &self.top
    }

    /// Returns the backend.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Returns the effective arbitration policy.
    pub fn arbitration(&self) -> Arbitration {
        self.arbitration
    }

    /// Creates arbitration state for one shared builtin port through the
    /// backend.
    pub fn arbitration_policy(&self) -> Box<dyn ArbitrationPolicy> {
        self.backend.arbitration_policy(self.arbitration)
    }

    /// Returns the output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns the interner holding every name in the graph.
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Returns the generated graph, once generation has succeeded.
    pub fn graph(&self) -> Option<&HwGraph> {
        self.graph
            .as_ref()
            .or_else(|| self.compiled.as_ref().map(|c| &c.graph))
    }

    /// Returns the compiled design, once compilation has succeeded.
    pub fn compiled(&self) -> Option<&CompiledDesign> {
        self.compiled.as_ref()
    }

    /// Returns the packaging report, once packaging has succeeded.
    pub fn report(&self) -> Option<&PackageReport> {
        self.report.as_ref()
    }

    /// Returns the diagnostic sink.
    pub fn sink(&self) -> &DiagnosticSink {
        &self.sink
    }

    /// Returns a snapshot of every diagnostic emitted so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.sink.diagnostics()
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field("top", &self.top)
            .field("backend", &self.backend.preset())
            .field("stage", &self.stage)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}
