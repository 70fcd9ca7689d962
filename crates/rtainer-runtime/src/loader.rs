//! The program-loader seam.
//!
//! The code loader is an external collaborator: "execute these bytes as
//! the program of the current task context". The container wrapper invokes
//! it after isolation is verified and the chroot applied.

use rtainer_common::error::{Result, RtainerError};

/// Executes program bytes in the calling task's context.
pub trait ProgramLoader: Send + Sync {
    /// Runs the program to completion.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not a loadable program or the program
    /// reports failure.
    fn execute(&self, program: &[u8]) -> Result<()>;
}

impl<F> ProgramLoader for F
where
    F: Fn(&[u8]) -> Result<()> + Send + Sync,
{
    fn execute(&self, program: &[u8]) -> Result<()> {
        self(program)
    }
}

/// Demo loader: validates the image is non-empty and logs its size.
#[derive(Debug, Default)]
pub struct EchoLoader;

impl ProgramLoader for EchoLoader {
    fn execute(&self, program: &[u8]) -> Result<()> {
        if program.is_empty() {
            return Err(RtainerError::ImageFormat {
                message: "program is empty".into(),
            });
        }
        tracing::info!(bytes = program.len(), "program executed");
        Ok(())
    }
}
