//! Command-line conventions of the MKVToolNix tools.
//!
//! Every invocation engages `no_variable_data` so that output does not
//! depend on the date, the library versions or random UIDs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::context::CaseContext;
use crate::error::CaseResult;
use crate::runner::{Execution, ExpectedExit};

pub const MKVMERGE: &str = "mkvmerge";
pub const MKVINFO: &str = "mkvinfo";
pub const MKVEXTRACT: &str = "mkvextract";
pub const MKVPROPEDIT: &str = "mkvpropedit";
pub const EBML_VALIDATOR: &str = "tools/ebml_validator";

const NO_VARIABLE_DATA: &str = "--engage no_variable_data";

/// Options for [`CaseContext::merge`].
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub exit_code: ExpectedExit,
    /// Output file; the current temp file when `None`.
    pub output: Option<PathBuf>,
}

/// `--identification-format` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentificationFormat {
    Text,
    VerboseText,
    Json,
}

impl IdentificationFormat {
    pub fn as_arg(&self) -> &'static str {
        match self {
            IdentificationFormat::Text => "text",
            IdentificationFormat::VerboseText => "verbose-text",
            IdentificationFormat::Json => "json",
        }
    }
}

/// Options for [`CaseContext::identify`].
#[derive(Debug, Clone)]
pub struct IdentifyOptions {
    pub exit_code: ExpectedExit,
    pub verbose: bool,
    /// Overrides the format implied by `verbose`.
    pub format: Option<IdentificationFormat>,
}

impl Default for IdentifyOptions {
    fn default() -> Self {
        Self {
            exit_code: ExpectedExit::Success,
            verbose: true,
            format: None,
        }
    }
}

impl IdentifyOptions {
    pub fn effective_format(&self) -> IdentificationFormat {
        self.format.unwrap_or(if self.verbose {
            IdentificationFormat::VerboseText
        } else {
            IdentificationFormat::Text
        })
    }
}

/// Where `mkvinfo` output goes.
#[derive(Debug, Clone, Default)]
pub enum InfoOutput {
    /// Redirect into the current temp file.
    #[default]
    Tmp,
    /// Redirect into the given file.
    File(PathBuf),
    /// Append a raw redirect or pipe, e.g. `| head -n 5 > out`.
    Raw(String),
    /// No redirect; lines come back in [`Execution::output`].
    Return,
}

/// Options for [`CaseContext::info`].
#[derive(Debug, Clone, Default)]
pub struct InfoOptions {
    pub exit_code: ExpectedExit,
    pub output: InfoOutput,
}

/// Options for [`CaseContext::extract`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub exit_code: ExpectedExit,
    /// Extraction mode (`tracks`, `tags`, `chapters`, ...).
    pub mode: String,
    /// Track id to output file.
    pub tracks: BTreeMap<u32, String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            exit_code: ExpectedExit::Success,
            mode: "tracks".to_string(),
            tracks: BTreeMap::new(),
        }
    }
}

impl ExtractOptions {
    pub fn track(mut self, id: u32, output: impl Into<String>) -> Self {
        self.tracks.insert(id, output.into());
        self
    }
}

impl CaseContext {
    /// `mkvmerge -o <output> <args>`.
    pub async fn merge(&self, args: &str, options: MergeOptions) -> CaseResult<Execution> {
        let output = options.output.unwrap_or_else(|| self.tmp());
        let command = format!(
            "{} {NO_VARIABLE_DATA} -o {} {args}",
            self.tool(MKVMERGE),
            output.display()
        );
        self.sys(command, options.exit_code).await
    }

    /// `mkvmerge --identify --identification-format <fmt> <args>`.
    pub async fn identify(&self, args: &str, options: IdentifyOptions) -> CaseResult<Execution> {
        let command = format!(
            "{} --identify --identification-format {} {NO_VARIABLE_DATA} {args}",
            self.tool(MKVMERGE),
            options.effective_format().as_arg()
        );
        self.sys(command, options.exit_code).await
    }

    /// `mkvinfo --ui-language en_US <args>` with the configured redirect.
    pub async fn info(&self, args: &str, options: InfoOptions) -> CaseResult<Execution> {
        let redirect = match options.output {
            InfoOutput::Tmp => format!("> {}", self.tmp_str()),
            InfoOutput::File(path) => format!("> {}", path.display()),
            InfoOutput::Raw(raw) if raw.starts_with('>') || raw.starts_with('|') => raw,
            InfoOutput::Raw(raw) => format!("> {raw}"),
            InfoOutput::Return => String::new(),
        };
        let command = format!(
            "{} {NO_VARIABLE_DATA} --ui-language en_US {args} {redirect}",
            self.tool(MKVINFO)
        );
        self.sys(command.trim_end().to_string(), options.exit_code)
            .await
    }

    /// `mkvextract <mode> <args> <tid:file>...`.
    pub async fn extract(&self, args: &str, options: ExtractOptions) -> CaseResult<Execution> {
        let tracks = options
            .tracks
            .iter()
            .map(|(id, file)| format!("{id}:{file}"))
            .collect::<Vec<_>>()
            .join(" ");
        let command = format!(
            "{} {NO_VARIABLE_DATA} {} {args} {tracks}",
            self.tool(MKVEXTRACT),
            options.mode
        );
        self.sys(command.trim_end().to_string(), options.exit_code)
            .await
    }

    /// `mkvpropedit <file> <args>`, followed by a structural check of the
    /// modified file when `ebml_validator` was built.
    pub async fn propedit(
        &self,
        file: &str,
        args: &str,
        exit_code: ExpectedExit,
    ) -> CaseResult<Execution> {
        let command = format!("{} {NO_VARIABLE_DATA} {file} {args}", self.tool(MKVPROPEDIT));
        let result = self.sys(command, exit_code).await?;

        if self.env().has_tool(EBML_VALIDATOR) {
            self.sys(
                format!("{} -M {file}", self.tool(EBML_VALIDATOR)),
                ExpectedExit::Success,
            )
            .await?;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::HarnessEnv;
    use crate::id::TestIdentifier;
    use std::path::Path;
    use std::sync::Arc;

    /// A tool dir whose binaries print their own argument list.
    fn echo_toolkit(dir: &Path) -> Arc<CaseContext> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let tools = dir.join("bin");
            std::fs::create_dir_all(tools.join("tools")).unwrap();
            for name in [MKVMERGE, MKVINFO, MKVEXTRACT, MKVPROPEDIT] {
                let path = tools.join(name);
                std::fs::write(&path, format!("#!/bin/sh\necho {name} \"$@\"\n")).unwrap();
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            }
        }
        let env = HarnessEnv::default()
            .with_tool_dir(dir.join("bin"))
            .with_tmp_dir(dir)
            .with_timeout_secs(30);
        Arc::new(CaseContext::new(TestIdentifier::new(300, "helpers"), 0, Arc::new(env)))
    }

    #[test]
    fn identify_format_follows_verbosity() {
        assert_eq!(
            IdentifyOptions::default().effective_format(),
            IdentificationFormat::VerboseText
        );
        let terse = IdentifyOptions {
            verbose: false,
            ..Default::default()
        };
        assert_eq!(terse.effective_format(), IdentificationFormat::Text);
        let json = IdentifyOptions {
            format: Some(IdentificationFormat::Json),
            ..Default::default()
        };
        assert_eq!(json.effective_format().as_arg(), "json");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn identify_builds_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = echo_toolkit(dir.path());
        let run = ctx
            .identify("data/avi/v.avi", IdentifyOptions::default())
            .await
            .unwrap();
        assert_eq!(
            run.lines(),
            ["mkvmerge --identify --identification-format verbose-text --engage no_variable_data data/avi/v.avi".to_string()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn extract_appends_sorted_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = echo_toolkit(dir.path());
        let options = ExtractOptions::default().track(2, "b.srt").track(1, "a.h264");
        let run = ctx.extract("data/mkv/complex.mkv", options).await.unwrap();
        assert_eq!(
            run.lines(),
            ["mkvextract --engage no_variable_data tracks data/mkv/complex.mkv 1:a.h264 2:b.srt".to_string()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn info_redirects_into_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = echo_toolkit(dir.path());
        let run = ctx
            .info("data/mkv/complex.mkv", InfoOptions::default())
            .await
            .unwrap();
        assert!(run.output.is_none());
        let written = std::fs::read_to_string(ctx.tmp()).unwrap();
        assert!(written.starts_with("mkvinfo --engage no_variable_data --ui-language en_US"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn merge_writes_to_tmp_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = echo_toolkit(dir.path());
        let run = ctx.merge("data/avi/v.avi", MergeOptions::default()).await.unwrap();
        assert_eq!(
            run.lines(),
            [format!("mkvmerge --engage no_variable_data -o {} data/avi/v.avi", ctx.tmp_str())]
        );
    }
}
