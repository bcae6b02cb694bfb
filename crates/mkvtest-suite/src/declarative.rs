//! Cases assembled from setup, test and cleanup blocks.

use std::sync::Arc;

use mkvtest_core::{
    CaseContext, CaseResult, DeclarativeCase, ExpectedExit, ExtractOptions,
    IdentificationFormat, TestCase, TestOptions,
};

pub fn merge_avi_and_audio() -> Box<dyn TestCase> {
    let mut case = DeclarativeCase::new();
    case.describe("mkvmerge / AVI, MP3 and AC3 / in(AVI,MP3,AC3)")
        .test_merge("data/avi/v.avi", TestOptions::default())
        .test_merge(
            "data/simple/v.mp3",
            TestOptions {
                args: Some("--default-duration 0:25fps".to_string()),
                ..Default::default()
            },
        )
        .test_merge("data/simple/v.ac3", TestOptions::default());
    Box::new(case)
}

pub fn merge_broken_input() -> Box<dyn TestCase> {
    let mut case = DeclarativeCase::new();
    case.describe("mkvmerge / truncated input is rejected")
        .test_merge(
            "data/bugs/truncated.mkv",
            TestOptions {
                exit_code: ExpectedExit::Error,
                ..Default::default()
            },
        );
    Box::new(case)
}

/// Drops the lines carrying the identifier of the muxing application.
fn without_muxing_application(text: &str) -> String {
    text.lines()
        .filter(|line| !line.contains("muxing_application"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn identification_formats() -> Box<dyn TestCase> {
    let mut case = DeclarativeCase::new();
    case.describe("mkvmerge / identification in all output formats")
        .test_identify("data/mkv/complex.mkv", TestOptions::default())
        .test_identify(
            "data/mkv/complex.mkv",
            TestOptions {
                verbose: Some(false),
                ..Default::default()
            },
        )
        .test_identify(
            "data/mkv/complex.mkv",
            TestOptions {
                format: Some(IdentificationFormat::Json),
                filter: Some(Arc::new(without_muxing_application)),
                ..Default::default()
            },
        );
    Box::new(case)
}

pub fn info_summary() -> Box<dyn TestCase> {
    let mut case = DeclarativeCase::new();
    case.describe("mkvinfo / summary and full output")
        .test_info("data/mkv/complex.mkv", TestOptions::default())
        .test_info(
            "data/mkv/complex.mkv",
            TestOptions {
                args: Some("--summary".to_string()),
                ..Default::default()
            },
        );
    Box::new(case)
}

pub fn unsupported_containers() -> Box<dyn TestCase> {
    let mut case = DeclarativeCase::new();
    case.describe("mkvmerge / unsupported containers are reported")
        .test_merge_unsupported("data/unsupported/mpeg4_part_2.xvid", TestOptions::default())
        .test_merge_unsupported("data/unsupported/v.asf", TestOptions::default());
    Box::new(case)
}

pub fn ui_locale_de_de() -> Box<dyn TestCase> {
    let mut case = DeclarativeCase::new();
    case.test_ui_locale("de_DE");
    Box::new(case)
}

/// Working copy edited in place by the propedit case; carries the scoped
/// temp prefix so it is removed with the case's other temp files.
fn work_copy(ctx: &CaseContext) -> String {
    format!("{}work.mkv", ctx.tmp_name_prefix())
}

async fn copy_source(ctx: Arc<CaseContext>) -> CaseResult<()> {
    tokio::fs::copy(ctx.env().resolve("data/mkv/complex.mkv"), work_copy(&ctx)).await?;
    Ok(())
}

async fn set_title(ctx: Arc<CaseContext>) -> CaseResult<String> {
    let file = work_copy(&ctx);
    ctx.propedit(&file, "--edit info --set title=mkvtest", ExpectedExit::Success)
        .await?;
    ctx.hash_file(&file).await
}

async fn delete_title(ctx: Arc<CaseContext>) -> CaseResult<String> {
    let file = work_copy(&ctx);
    ctx.propedit(&file, "--edit info --delete title", ExpectedExit::Success)
        .await?;
    ctx.hash_file(&file).await
}

async fn remove_work_copy(ctx: Arc<CaseContext>) -> CaseResult<()> {
    if ctx.env().keep_tmp_files {
        return Ok(());
    }
    match tokio::fs::remove_file(work_copy(&ctx)).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

pub fn propedit_title() -> Box<dyn TestCase> {
    let mut case = DeclarativeCase::new();
    case.describe("mkvpropedit / set and delete the segment title")
        .setup(copy_source)
        .test("set title", set_title)
        .test("delete title", delete_title)
        .cleanup(remove_work_copy);
    Box::new(case)
}

async fn extract_video_and_subtitles(ctx: Arc<CaseContext>) -> CaseResult<String> {
    let video = ctx.tmp_name();
    let subtitles = ctx.tmp_name();
    ctx.extract(
        "data/mkv/complex.mkv",
        ExtractOptions::default()
            .track(0, video.display().to_string())
            .track(3, subtitles.display().to_string()),
    )
    .await?;
    Ok(format!(
        "{}+{}",
        ctx.hash_file(&video).await?,
        ctx.hash_file(&subtitles).await?
    ))
}

pub fn extract_tracks() -> Box<dyn TestCase> {
    let mut case = DeclarativeCase::new();
    case.describe("mkvextract / tracks / out(H.264,SRT)")
        .test("video and subtitles", extract_video_and_subtitles);
    Box::new(case)
}
