//! Declarative cases: setup, named test and cleanup blocks registered at
//! construction time.
//!
//! `run_all` executes setup blocks, then every test block (each isolated:
//! a fault contributes an empty fingerprint and the remaining blocks still
//! run), then every cleanup block regardless of what happened before, then
//! removes the case's temp files.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::{guarded, CompositeSignature, SubTestOutcome, SubTestResult, TestCase};
use crate::context::{CaseContext, TmpScope};
use crate::error::{CaseError, CaseResult};
use crate::obs;
use crate::runner::ExpectedExit;
use crate::toolkit::{
    IdentificationFormat, IdentifyOptions, InfoOptions, InfoOutput, MergeOptions, MKVINFO,
    MKVMERGE,
};

type HookBlock = Arc<dyn Fn(Arc<CaseContext>) -> BoxFuture<'static, CaseResult<()>> + Send + Sync>;
type TestBlock =
    Arc<dyn Fn(Arc<CaseContext>) -> BoxFuture<'static, CaseResult<String>> + Send + Sync>;

/// Rewrites command output before it is hashed.
pub type OutputFilter = Arc<dyn Fn(&str) -> String + Send + Sync>;

struct NamedTest {
    name: String,
    block: TestBlock,
}

/// Per-test options shared by the `test_*` helpers.
#[derive(Clone, Default)]
pub struct TestOptions {
    /// Extra arguments placed before the file name.
    pub args: Option<String>,
    pub exit_code: ExpectedExit,
    /// Explicit output file instead of the current temp file.
    pub output: Option<String>,
    /// Hash the output without removing it.
    pub keep_tmp: bool,
    /// Identification only: `false` selects terse text output.
    pub verbose: Option<bool>,
    /// Identification only: explicit output format.
    pub format: Option<IdentificationFormat>,
    /// Identification only: rewrite the output before hashing.
    pub filter: Option<OutputFilter>,
}

impl TestOptions {
    fn command_line(&self, file: &str) -> String {
        match &self.args {
            Some(args) if !args.is_empty() => format!("{args} {file}"),
            _ => file.to_string(),
        }
    }
}

#[derive(Default)]
pub struct DeclarativeCase {
    description: Option<String>,
    setup: Vec<HookBlock>,
    tests: Vec<NamedTest>,
    cleanup: Vec<HookBlock>,
}

impl DeclarativeCase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    pub fn setup<F, Fut>(&mut self, block: F) -> &mut Self
    where
        F: Fn(Arc<CaseContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CaseResult<()>> + Send + 'static,
    {
        self.setup.push(Arc::new(move |ctx| block(ctx).boxed()));
        self
    }

    pub fn test<F, Fut>(&mut self, name: impl Into<String>, block: F) -> &mut Self
    where
        F: Fn(Arc<CaseContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CaseResult<String>> + Send + 'static,
    {
        self.tests.push(NamedTest {
            name: name.into(),
            block: Arc::new(move |ctx| block(ctx).boxed()),
        });
        self
    }

    pub fn cleanup<F, Fut>(&mut self, block: F) -> &mut Self
    where
        F: Fn(Arc<CaseContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CaseResult<()>> + Send + 'static,
    {
        self.cleanup.push(Arc::new(move |ctx| block(ctx).boxed()));
        self
    }

    /// Number of registered test blocks.
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Merge `file` and hash the result. An expected exit code of `error`
    /// contributes the literal `error` instead of a hash.
    pub fn test_merge(&mut self, file: &str, options: TestOptions) -> &mut Self {
        let command_line = options.command_line(file);
        let name = command_line.clone();
        self.test(name, move |ctx| {
            let command_line = command_line.clone();
            let options = options.clone();
            async move {
                let output = options
                    .output
                    .clone()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| ctx.tmp());
                ctx.merge(
                    &command_line,
                    MergeOptions {
                        exit_code: options.exit_code,
                        output: Some(output.clone()),
                    },
                )
                .await?;

                if options.exit_code == ExpectedExit::Error {
                    Ok("error".to_string())
                } else if options.keep_tmp || options.output.is_some() {
                    ctx.hash_file(&output).await
                } else {
                    ctx.hash_tmp(true).await
                }
            }
        })
    }

    /// Identify `file` and hash the (optionally filtered) output.
    pub fn test_identify(&mut self, file: &str, options: TestOptions) -> &mut Self {
        let identify = IdentifyOptions {
            exit_code: options.exit_code,
            verbose: options.verbose.unwrap_or(true),
            format: options.format,
        };
        let command_line = options.command_line(file);
        let name = format!(
            "--identification-format {} {command_line}",
            identify.effective_format().as_arg()
        );

        self.test(name, move |ctx| {
            let command_line = command_line.clone();
            let identify = identify.clone();
            let options = options.clone();
            async move {
                let tmp = ctx.tmp();
                ctx.identify(&format!("{command_line} > {}", tmp.display()), identify.clone())
                    .await?;

                if options.filter.is_some()
                    || identify.effective_format() == IdentificationFormat::Json
                {
                    let text = tokio::fs::read_to_string(&tmp).await?;
                    if identify.effective_format() == IdentificationFormat::Json {
                        ctx.env().identification_schema()?.validate(&text)?;
                    }
                    if let Some(filter) = &options.filter {
                        tokio::fs::write(&tmp, format!("{}\n", filter(&text))).await?;
                    }
                }

                if options.keep_tmp {
                    ctx.hash_file(&tmp).await
                } else {
                    ctx.hash_tmp(true).await
                }
            }
        })
    }

    /// Run `mkvinfo` on `file` and hash its output.
    pub fn test_info(&mut self, file: &str, options: TestOptions) -> &mut Self {
        let command_line = options.command_line(file);
        let name = command_line.clone();
        self.test(name, move |ctx| {
            let command_line = command_line.clone();
            let options = options.clone();
            async move {
                let output = options
                    .output
                    .clone()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| ctx.tmp());
                ctx.info(
                    &command_line,
                    InfoOptions {
                        exit_code: options.exit_code,
                        output: InfoOutput::File(output.clone()),
                    },
                )
                .await?;

                if options.keep_tmp || options.output.is_some() {
                    ctx.hash_file(&output).await
                } else {
                    ctx.hash_tmp(true).await
                }
            }
        })
    }

    /// Expect `mkvmerge` to reject `file` as an unsupported container.
    /// Contributes `ok` or `bad`.
    pub fn test_merge_unsupported(&mut self, file: &str, options: TestOptions) -> &mut Self {
        let command_line = options.command_line(file);
        let name = command_line.clone();
        self.test(name, move |ctx| {
            let command_line = command_line.clone();
            async move {
                let tmp = ctx.tmp();
                ctx.sys(
                    format!(
                        "{} --identify-verbose {command_line} > {}",
                        ctx.tool(MKVMERGE),
                        tmp.display()
                    ),
                    ExpectedExit::Code(3),
                )
                .await?;
                let text = tokio::fs::read_to_string(&tmp).await?;
                let first = text.lines().next().unwrap_or_default();
                Ok(if first.contains("unsupported container") {
                    "ok"
                } else {
                    "bad"
                }
                .to_string())
            }
        })
    }

    /// Check that both `mkvmerge` and `mkvinfo` are translated into `locale`.
    /// Output identical to the `en_US` reference means the locale fell back
    /// to untranslated text.
    pub fn test_ui_locale(&mut self, locale: &str) -> &mut Self {
        self.describe(format!("mkvmerge / UI locale: {locale}"));

        let merge_locale = locale.to_string();
        self.test(format!("mkvmerge UI locale {locale}"), move |ctx| {
            let locale = merge_locale.clone();
            async move {
                let command = format!(
                    "{} -o /dev/null --ui-language {{locale}} data/avi/v.avi | head -n 2 | tail -n 1",
                    ctx.tool(MKVMERGE)
                );
                compare_ui_locale(&ctx, &command, &locale).await
            }
        });

        let info_locale = locale.to_string();
        self.test(format!("mkvinfo UI locale {locale}"), move |ctx| {
            let locale = info_locale.clone();
            async move {
                let command = format!(
                    "{} --ui-language {{locale}} data/mkv/complex.mkv | head -n 2",
                    ctx.tool(MKVINFO)
                );
                compare_ui_locale(&ctx, &command, &locale).await
            }
        })
    }

    async fn run_setup(&self, ctx: &Arc<CaseContext>) -> CaseResult<()> {
        for block in &self.setup {
            guarded(block(Arc::clone(ctx)))
                .await
                .map_err(|e| CaseError::Setup(Box::new(e)))?;
        }
        Ok(())
    }

    async fn run_tests(&self, ctx: &Arc<CaseContext>) -> Vec<SubTestResult> {
        let mut results = Vec::with_capacity(self.tests.len());
        for test in &self.tests {
            let outcome = match guarded((test.block)(Arc::clone(ctx))).await {
                Ok(fingerprint) => SubTestOutcome::Ok(fingerprint),
                Err(e) => {
                    obs::emit_subtest_fault(&ctx.id().name(), &test.name, &e);
                    SubTestOutcome::Fault(e.to_string())
                }
            };
            results.push(SubTestResult {
                name: test.name.clone(),
                outcome,
            });
        }
        results
    }

    /// Runs every cleanup block; reports the first failure.
    async fn run_cleanup(&self, ctx: &Arc<CaseContext>) -> CaseResult<()> {
        let mut first_error = None;
        for block in &self.cleanup {
            if let Err(e) = guarded(block(Arc::clone(ctx))).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Placeholder in UI locale command templates replaced by the locale under test.
const LOCALE_PLACEHOLDER: &str = "{locale}";

const REFERENCE_LOCALE: &str = "en_US";

async fn compare_ui_locale(ctx: &CaseContext, template: &str, locale: &str) -> CaseResult<String> {
    let run = move |locale: String| async move {
        let out = format!("{}-{locale}", ctx.tmp_str());
        ctx.sys(
            format!("{} > {out}", template.replace(LOCALE_PLACEHOLDER, &locale)),
            ExpectedExit::Success,
        )
        .await?;
        ctx.hash_file(&out).await
    };

    let hash = run(locale.to_string()).await?;
    if !locale.starts_with("en") && hash == run(REFERENCE_LOCALE.to_string()).await? {
        return Err(ctx.error(format!("Locale {locale} not supported by MKVToolNix")));
    }
    Ok(hash)
}

#[async_trait]
impl TestCase for DeclarativeCase {
    fn description(&self) -> CaseResult<String> {
        self.description.clone().ok_or(CaseError::MissingDescription)
    }

    async fn run_all(&self, ctx: Arc<CaseContext>) -> CaseResult<CompositeSignature> {
        let _scope = TmpScope::new(Arc::clone(&ctx));

        let body = match self.run_setup(&ctx).await {
            Ok(()) => Ok(self.run_tests(&ctx).await),
            Err(e) => Err(e),
        };
        let cleanup = self.run_cleanup(&ctx).await;

        let sub_tests = body?;
        cleanup?;
        Ok(CompositeSignature::from_sub_tests(sub_tests))
    }
}
