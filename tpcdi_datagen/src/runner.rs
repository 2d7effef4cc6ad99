use std::{path::Path, process::Stdio};

use observability_deps::tracing::{debug, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{ChildStdin, Command},
};

use crate::{Error, PromptProtocol, Result};

/// The executable invoked to generate data, without the scale factor and output arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl GeneratorCommand {
    /// `java -jar DIGen.jar`, run from the tool directory.
    pub fn digen() -> Self {
        Self {
            program: "java".to_owned(),
            args: vec!["-jar".to_owned(), "DIGen.jar".to_owned()],
        }
    }

    fn command(&self, tool_dir: &Path, scale_factor: u32, output_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("-sf")
            .arg(scale_factor.to_string())
            .arg("-o")
            .arg(output_dir)
            .current_dir(tool_dir);
        cmd
    }
}

impl Default for GeneratorCommand {
    fn default() -> Self {
        Self::digen()
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

/// Run the generator in `tool_dir` until it exits, answering its prompts from `protocol`.
///
/// Standard output is logged line by line and checked against the protocol afterwards; standard
/// error is logged at warn level. A non-zero exit status is an error.
pub async fn run_generator(
    command: &GeneratorCommand,
    protocol: &PromptProtocol,
    tool_dir: &Path,
    scale_factor: u32,
    output_dir: &Path,
) -> Result<()> {
    info!(
        program = %command.program,
        output = %output_dir.display(),
        scale_factor,
        "generating data"
    );
    let mut child = command
        .command(tool_dir, scale_factor, output_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::Spawn {
            program: command.program.clone(),
            source,
        })?;

    let mut stdin = child.stdin.take().ok_or(Error::MissingPipe("stdin"))?;
    let stdout = child.stdout.take().ok_or(Error::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(Error::MissingPipe("stderr"))?;

    let stderr_task = tokio::spawn(async move {
        // drain until EOF even when the output is not UTF-8, the generator blocks on a full pipe
        let mut lines = BufReader::new(stderr).split(b'\n');
        while let Ok(Some(line)) = lines.next_segment().await {
            warn!("{}", String::from_utf8_lossy(&line).trim_end());
        }
    });

    for response in protocol.responses() {
        if let Err(e) = write_line(&mut stdin, response).await {
            // the exit status tells why the generator stopped listening
            warn!(%e, %protocol, "unable to answer generator prompt");
            break;
        }
    }
    // a prompt the protocol does not answer reads end of file instead of waiting forever
    drop(stdin);

    let mut transcript = String::new();
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await.map_err(Error::Output)? {
        let line = line.trim();
        if !line.is_empty() {
            info!("{line}");
        }
        transcript.push_str(line);
        transcript.push('\n');
    }

    let status = child.wait().await.map_err(Error::Output)?;
    stderr_task.await?;
    debug!(%status, "generator exited");

    if let Some(exchange) = protocol.first_unmatched(&transcript) {
        warn!(
            %protocol,
            expected = %exchange.expect,
            "generator output did not contain the expected prompt, the prompt protocol may be out of date"
        );
    }

    if !status.success() {
        return Err(Error::GeneratorFailed { status });
    }
    Ok(())
}
