//! Cases written as a single `run` routine.

use std::path::PathBuf;

use async_trait::async_trait;
use mkvtest_core::toolkit::MKVINFO;
use mkvtest_core::{
    CaseContext, CaseResult, ExpectedExit, ExtractOptions, IdentifyOptions, MergeOptions,
    ProceduralCase, Procedure, TestCase,
};
use tracing::debug;

/// `mkvmerge` split into exactly two files of at most 4 MB.
pub struct SplittingBySize;

#[async_trait]
impl Procedure for SplittingBySize {
    fn description(&self) -> &str {
        "mkvmerge / splitting by file size / in(AVI)"
    }

    async fn run(&self, ctx: &CaseContext) -> CaseResult<String> {
        let tmp = ctx.tmp_str();
        ctx.merge(
            "--split-max-files 2 --split 4m data/avi/v.avi",
            MergeOptions {
                output: Some(PathBuf::from(format!("{tmp}-%03d"))),
                ..Default::default()
            },
        )
        .await?;

        // A missing part surfaces as a fault naming the file.
        let first = ctx.hash_file(format!("{tmp}-001")).await?;
        let second = ctx.hash_file(format!("{tmp}-002")).await?;
        Ok(format!("{first}-{second}"))
    }
}

/// Tags extracted as XML.
pub struct ExtractTags;

#[async_trait]
impl Procedure for ExtractTags {
    fn description(&self) -> &str {
        "mkvextract / tags / out(XML)"
    }

    async fn run(&self, ctx: &CaseContext) -> CaseResult<String> {
        ctx.extract(
            &format!("data/mkv/complex.mkv > {} 2>&1", ctx.tmp_str()),
            ExtractOptions {
                mode: "tags".to_string(),
                ..Default::default()
            },
        )
        .await?;
        ctx.hash_tmp(true).await
    }
}

/// Files identified by the verbose identification.
pub const IDENTIFICATION_INPUTS: &[&str] = &[
    "data/avi/v.avi",
    "data/bugs/From_Nero_AVC_Muxer.mp4",
    "data/mkv/complex.mkv",
    "data/mkv/vobsubs.mks",
    "data/mp4/test_2000_inloop.mp4",
    "data/mp4/test_mp2.mp4",
    "data/ogg/v.flac.ogg",
    "data/ogg/v.ogg",
    "data/rm/rv3.rm",
    "data/rm/rv4.rm",
    "data/simple/misdetected_as_mp2.ac3",
    "data/simple/misdetected_as_mpeges.ac3",
    "data/simple/v.aac",
    "data/simple/v.ac3",
    "data/simple/v.flac",
    "data/simple/v.mp3",
    "data/simple/v.wav",
    "data/textsubs/fe.ssa",
    "data/textsubs/vde.srt",
    "data/vobsub/ally1-short.sub",
    "data/wp/with-correction.wv",
    "data/wp/without-correction.wv",
];

pub struct FileIdentification;

#[async_trait]
impl Procedure for FileIdentification {
    fn description(&self) -> &str {
        "mkvmerge / file identification / in(*)"
    }

    async fn run(&self, ctx: &CaseContext) -> CaseResult<String> {
        let mut hashes = Vec::with_capacity(IDENTIFICATION_INPUTS.len());
        for file in IDENTIFICATION_INPUTS {
            ctx.identify(
                &format!("{file} > {}", ctx.tmp_str()),
                IdentifyOptions::default(),
            )
            .await?;
            hashes.push(ctx.hash_tmp(true).await?);
        }
        Ok(hashes.join("-"))
    }
}

/// Cropping and stereo mode survive remuxing and can be overridden.
pub struct CroppingStereoMode;

impl CroppingStereoMode {
    const REMUX_ARGS: [&'static str; 2] = ["", "--cropping 1:5,6,7,8 --stereo-mode 1:right"];

    /// Crop and stereo values reported by `mkvinfo`, sorted and joined.
    async fn crop_and_stereo(ctx: &CaseContext, file: &str) -> CaseResult<String> {
        let command = format!(
            "{} --ui-language en_US \"{file}\" | grep -E -i 'crop|stereo' | \
             sed -e 's/Stereo mode: /: S/' -e 's/.*: //' -e 's/ .*//' | \
             sort -n | tr '\\n' '-' | sed -e 's/-$//'",
            ctx.tool(MKVINFO)
        );
        let out = ctx.capture_stdout(command).await?;
        Ok(out.trim_end().to_string())
    }
}

#[async_trait]
impl Procedure for CroppingStereoMode {
    fn description(&self) -> &str {
        "mkvmerge / Handling of cropping & stereo mode"
    }

    async fn run(&self, ctx: &CaseContext) -> CaseResult<String> {
        let source = ctx.tmp_str();
        ctx.merge(
            "--cropping 3:1,2,3,4 --stereo-mode 3:left -A data/mp4/rain_800.mp4",
            MergeOptions::default(),
        )
        .await?;

        let mut result = String::new();
        for (idx, args) in Self::REMUX_ARGS.iter().enumerate() {
            let output = format!("{source}{idx}");
            let merge_args = format!("{args} {source}");
            ctx.merge(
                merge_args.trim_start(),
                MergeOptions {
                    exit_code: ExpectedExit::Success,
                    output: Some(PathBuf::from(&output)),
                },
            )
            .await?;
            let info = Self::crop_and_stereo(ctx, &output).await?;
            debug!(pass = idx, info = %info, "cropping and stereo mode");
            result.push_str(&format!("{idx}[{info}]"));
        }
        Ok(result)
    }
}

pub fn splitting_by_size() -> Box<dyn TestCase> {
    Box::new(ProceduralCase(SplittingBySize))
}

pub fn extract_tags() -> Box<dyn TestCase> {
    Box::new(ProceduralCase(ExtractTags))
}

pub fn file_identification() -> Box<dyn TestCase> {
    Box::new(ProceduralCase(FileIdentification))
}

pub fn cropping_stereo_mode() -> Box<dyn TestCase> {
    Box::new(ProceduralCase(CroppingStereoMode))
}
