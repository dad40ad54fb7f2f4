pub mod launcher;
pub mod tokio_launcher;
pub mod tracing_launcher;

pub use launcher::{
    CompletedProcess, ExitState, LaunchError, OutputChunk, ProcessHandle, ProcessLauncher,
    SpawnOptions, SpawnSpec,
};
pub use tokio_launcher::TokioLauncher;
pub use tracing_launcher::TracingLauncher;
