//! Compile a [`NormalizedRequest`] into a transcoder argument vector.
//!
//! The argument order is fixed: input, filters, trim, frame rate, codec block,
//! keyframe interval, then the output flags. Output always goes to stdout.

use crate::error::QueryParameterError;
use crate::request::{NormalizedRequest, OutputFormat};

use super::quality::{map_quality, Scale, AV1_CRF, H264_CRF, JPEG_QSCALE, PUBLIC_SCALE};

/// Container of the produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Mp4,
    Jpg,
}

impl FileType {
    /// MIME type of the artifact.
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Mp4 => "video/mp4",
            FileType::Jpg => "image/jpeg",
        }
    }
}

/// A ready-to-run transcoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledInvocation {
    /// Arguments, without the program name
    pub args: Vec<String>,
    pub file_type: FileType,
}

/// Build the argument vector for `request`.
///
/// Deterministic: equal requests always compile to equal vectors.
pub fn compile(request: &NormalizedRequest) -> Result<CompiledInvocation, QueryParameterError> {
    let mut args: Vec<String> = vec!["-i".into(), request.source.clone()];

    if let Some(filter) = scale_filter(request.width, request.height)? {
        args.extend(["-vf".into(), filter]);
    }

    if let Some(start) = request.trim_start_ms {
        args.extend(["-ss".into(), format_seconds(start)]);
    }
    if let Some(end) = request.trim_end_ms {
        let duration = end.saturating_sub(request.trim_start_ms.unwrap_or(0));
        args.extend(["-t".into(), format_seconds(duration)]);
    }

    if let Some(fps) = request.fps {
        args.extend(["-r".into(), fps.to_string()]);
    }

    let file_type = match request.format {
        OutputFormat::H264 => {
            args.extend(
                ["-c:v", "libx264", "-preset", "ultrafast", "-f", "mp4"].map(String::from),
            );
            push_quality(&mut args, "-crf", H264_CRF, request.quality)?;
            args.extend(["-movflags", "frag_keyframe+empty_moov"].map(String::from));
            FileType::Mp4
        }
        OutputFormat::Av1 => {
            args.extend(["-c:v", "libsvtav1"].map(String::from));
            push_quality(&mut args, "-crf", AV1_CRF, request.quality)?;
            args.extend(["-f", "mp4", "-movflags", "frag_keyframe+empty_moov"].map(String::from));
            FileType::Mp4
        }
        OutputFormat::Jpg => {
            args.extend(["-vframes", "1", "-f", "image2", "-vcodec", "mjpeg"].map(String::from));
            push_quality(&mut args, "-q:v", JPEG_QSCALE, request.quality)?;
            FileType::Jpg
        }
    };

    if let Some(interval) = request.keyframe_interval {
        args.extend(["-g".into(), interval.to_string()]);
    }

    args.extend(["-an", "-v", "verbose", "-"].map(String::from));

    Ok(CompiledInvocation { args, file_type })
}

/// Scale (and, with both dimensions, cover-crop) filter expression.
///
/// A missing dimension is derived from the aspect ratio and rounded down to
/// an even number.
fn scale_filter(
    width: Option<u32>,
    height: Option<u32>,
) -> Result<Option<String>, QueryParameterError> {
    for (name, value) in [("size (width)", width), ("size (height)", height)] {
        if let Some(value) = value {
            if value % 2 != 0 {
                return Err(QueryParameterError::new(format!(
                    "GET parameter \"{}\" must be an even number; you used {} instead.",
                    name, value
                )));
            }
        }
    }

    Ok(match (width, height) {
        (Some(w), None) => Some(format!("scale={}:trunc(ow/a/2)*2", w)),
        (None, Some(h)) => Some(format!("scale=trunc(oh*a/2)*2:{}", h)),
        (Some(w), Some(h)) => Some(format!(
            "scale='if(gt(a,{w}/{h}),-1,{w})':'if(gt(a,{w}/{h}),{h},-1)',crop={w}:{h}"
        )),
        (None, None) => None,
    })
}

fn push_quality(
    args: &mut Vec<String>,
    flag: &str,
    scale: Scale,
    quality: Option<u8>,
) -> Result<(), QueryParameterError> {
    if let Some(quality) = quality {
        let mapped = map_quality(PUBLIC_SCALE, scale, f64::from(quality)).map_err(|e| {
            QueryParameterError::new(format!("GET parameter \"quality\" is invalid: {}.", e))
        })?;
        args.extend([flag.to_string(), format!("{}", mapped.round() as i64)]);
    }
    Ok(())
}

/// Milliseconds as `seconds.mmm`.
fn format_seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "https://example.com/video.mp4";

    fn args_of(request: &NormalizedRequest) -> Vec<String> {
        compile(request).unwrap().args
    }

    fn joined(request: &NormalizedRequest) -> String {
        args_of(request).join(" ")
    }

    #[test]
    fn test_defaults_to_h264() {
        let compiled = compile(&NormalizedRequest::new(SOURCE)).unwrap();
        assert_eq!(compiled.file_type, FileType::Mp4);
        assert_eq!(
            compiled.args.join(" "),
            "-i https://example.com/video.mp4 -c:v libx264 -preset ultrafast -f mp4 \
             -movflags frag_keyframe+empty_moov -an -v verbose -"
        );
    }

    #[test]
    fn test_width_only() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.width = Some(240);
        let args = args_of(&request);
        assert_eq!(args[2], "-vf");
        assert_eq!(args[3], "scale=240:trunc(ow/a/2)*2");
    }

    #[test]
    fn test_height_only() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.height = Some(180);
        assert_eq!(args_of(&request)[3], "scale=trunc(oh*a/2)*2:180");
    }

    #[test]
    fn test_width_and_height_cover_crop() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.width = Some(20);
        request.height = Some(40);
        assert_eq!(
            args_of(&request)[3],
            "scale='if(gt(a,20/40),-1,20)':'if(gt(a,20/40),40,-1)',crop=20:40"
        );
    }

    #[test]
    fn test_rejects_odd_dimensions() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.height = Some(41);
        let err = compile(&request).unwrap_err();
        assert!(err.message().contains("even number"));
    }

    #[test]
    fn test_trim() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.trim_start_ms = Some(2010);
        request.trim_end_ms = Some(3112);
        assert!(joined(&request).contains("-ss 2.010 -t 1.102"));

        let mut request = NormalizedRequest::new(SOURCE);
        request.trim_end_ms = Some(1500);
        let line = joined(&request);
        assert!(line.contains("-t 1.500"));
        assert!(!line.contains("-ss"));
    }

    #[test]
    fn test_trim_start_zero_is_emitted() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.trim_start_ms = Some(0);
        assert!(joined(&request).contains("-ss 0.000"));
    }

    #[test]
    fn test_fps() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.fps = Some(29.97);
        assert!(joined(&request).contains("-r 29.97"));
        request.fps = Some(30.0);
        assert!(joined(&request).contains("-r 30 "));
    }

    #[test]
    fn test_quality_h264() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.quality = Some(50);
        assert!(joined(&request).contains("-f mp4 -crf 26 -movflags"));
        request.quality = Some(100);
        assert!(joined(&request).contains("-crf 0 "));
    }

    #[test]
    fn test_av1() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.format = OutputFormat::Av1;
        request.quality = Some(0);
        let compiled = compile(&request).unwrap();
        assert_eq!(compiled.file_type, FileType::Mp4);
        assert!(compiled
            .args
            .join(" ")
            .contains("-c:v libsvtav1 -crf 63 -f mp4 -movflags frag_keyframe+empty_moov"));
    }

    #[test]
    fn test_jpg() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.format = OutputFormat::Jpg;
        request.quality = Some(100);
        let compiled = compile(&request).unwrap();
        assert_eq!(compiled.file_type, FileType::Jpg);
        assert_eq!(compiled.file_type.mime_type(), "image/jpeg");
        let line = compiled.args.join(" ");
        assert!(line.contains("-vframes 1 -f image2 -vcodec mjpeg -q:v 1"));
        assert!(!line.contains("movflags"));
    }

    #[test]
    fn test_keyframe_interval() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.keyframe_interval = Some(0);
        assert!(joined(&request).ends_with("-g 0 -an -v verbose -"));
    }

    #[test]
    fn test_full_order() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.width = Some(100);
        request.trim_start_ms = Some(1000);
        request.trim_end_ms = Some(2000);
        request.fps = Some(25.0);
        request.quality = Some(100);
        request.keyframe_interval = Some(12);
        assert_eq!(
            joined(&request),
            "-i https://example.com/video.mp4 -vf scale=100:trunc(ow/a/2)*2 -ss 1.000 -t 1.000 \
             -r 25 -c:v libx264 -preset ultrafast -f mp4 -crf 0 \
             -movflags frag_keyframe+empty_moov -g 12 -an -v verbose -"
        );
    }

    #[test]
    fn test_deterministic() {
        let mut request = NormalizedRequest::new(SOURCE);
        request.quality = Some(42);
        assert_eq!(compile(&request).unwrap(), compile(&request.clone()).unwrap());
    }
}
