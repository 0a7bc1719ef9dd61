use crate::utils::util::Result;
use std::{
    fs::File,
    path::Path,
    process::{Command, Stdio},
};

/// Something that turns a VCF of unannotated records into an annotated VCF.
pub trait Annotator {
    fn name(&self) -> &str;

    /// Reads the VCF at `input` and writes the annotated VCF to `output`.
    fn annotate(&mut self, input: &Path, output: &Path) -> Result<()>;
}

/// External program fed the input VCF on stdin, its stdout captured as the output VCF.
#[derive(Debug, Clone)]
pub struct CommandAnnotator {
    program: String,
    args: Vec<String>,
}

impl CommandAnnotator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Annotator for CommandAnnotator {
    fn name(&self) -> &str {
        &self.program
    }

    fn annotate(&mut self, input: &Path, output: &Path) -> Result<()> {
        let stdin = File::open(input)?;
        let stdout = File::create(output)?;
        log::info!(
            "Running annotation tool: {} {}",
            self.program,
            self.args.join(" ")
        );
        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| {
                crate::vcfclean_error!("Failed to start annotation tool {}: {e}", self.program)
            })?;
        if !status.success() {
            return Err(crate::vcfclean_error!(
                "Annotation tool {} failed with {status}",
                self.program
            ));
        }
        Ok(())
    }
}
