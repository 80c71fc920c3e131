//! Validation and normalization of raw query parameters.

use url::{form_urlencoded, Url};

use crate::error::QueryParameterError;

use super::time::{parse_time_ms, TIME_FORMAT_HINT};
use super::{NormalizedRequest, OutputFormat};

/// Raw query fields in the order they appeared.
///
/// Keys may repeat; [`normalize`] rejects repeated keys it cares about.
#[derive(Debug, Clone, Default)]
pub struct QueryFields {
    pairs: Vec<(String, String)>,
}

impl QueryFields {
    /// Decode an `application/x-www-form-urlencoded` query string.
    pub fn parse(query: &str) -> Self {
        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    /// Build from already decoded pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Get the single value of a parameter.
    ///
    /// Empty values count as absent. Fails if the parameter occurs more than once.
    fn single(&self, name: &str) -> Result<Option<&str>, QueryParameterError> {
        let mut values = self.pairs.iter().filter(|(k, _)| k == name).map(|(_, v)| v);
        let first = values.next();
        if values.next().is_some() {
            return Err(QueryParameterError::new(format!(
                "GET parameter \"{}\" must be a single value; you probably passed multiple GET \
                 parameters of the same name.",
                name
            )));
        }
        Ok(first.map(String::as_str).filter(|v| !v.is_empty()))
    }
}

/// Validate raw query fields and build a [`NormalizedRequest`].
///
/// Every error message names the offending parameter.
pub fn normalize(fields: &QueryFields) -> Result<NormalizedRequest, QueryParameterError> {
    let source = fields
        .single("source")?
        .ok_or_else(|| QueryParameterError::new("Required GET parameter \"source\" is missing."))?;
    let mut request = NormalizedRequest::new(parse_source(source)?);

    if let Some(size) = fields.single("size")? {
        let (width, height) = parse_size(size)?;
        request.width = width;
        request.height = height;
    }

    if let Some(trim) = fields.single("trim")? {
        let (from, to) = parse_trim(trim)?;
        request.trim_start_ms = from;
        request.trim_end_ms = to;
    }

    if let Some(format) = fields.single("format")? {
        request.format = OutputFormat::from_name(format).ok_or_else(|| {
            let valid: Vec<&str> = OutputFormat::ALL.iter().map(|f| f.name()).collect();
            QueryParameterError::new(format!(
                "GET parameter \"format\" must be one of {}, is {} instead.",
                valid.join(", "),
                format
            ))
        })?;
    }

    if let Some(fps) = fields.single("fps")? {
        let fps = ensure_number(fps, "fps")?;
        if fps <= 0.0 {
            return Err(QueryParameterError::new(format!(
                "GET parameter \"fps\" must be a positive number, is {} instead.",
                fps
            )));
        }
        request.fps = Some(fps);
    }

    if let Some(quality) = fields.single("quality")? {
        let quality = ensure_number(quality, "quality")?.round().clamp(0.0, 100.0);
        request.quality = Some(quality as u8);
    }

    if let Some(keyframe) = fields.single("keyframe")? {
        let keyframe = ensure_number(keyframe, "keyframe")?;
        if keyframe.fract() != 0.0 || keyframe < 0.0 || keyframe > f64::from(u32::MAX) {
            return Err(QueryParameterError::new(format!(
                "GET parameter \"keyframe\" must be a non-negative integer, is {} instead.",
                keyframe
            )));
        }
        request.keyframe_interval = Some(keyframe as u32);
    }

    Ok(request)
}

/// Extract the optional attribution key (`key` parameter).
pub fn attribution_key(fields: &QueryFields) -> Result<Option<String>, QueryParameterError> {
    Ok(fields.single("key")?.map(str::to_string))
}

fn parse_source(source: &str) -> Result<String, QueryParameterError> {
    if !(source.starts_with("http://") || source.starts_with("https://")) {
        return Err(QueryParameterError::new(
            "GET parameter \"source\" must start with \"http://\" or \"https://\".",
        ));
    }
    Url::parse(source).map_err(|e| {
        QueryParameterError::new(format!(
            "GET parameter \"source\" is not a valid URL: {}.",
            e
        ))
    })?;
    Ok(source.to_string())
}

fn parse_size(size: &str) -> Result<(Option<u32>, Option<u32>), QueryParameterError> {
    let (raw_width, raw_height) = size.split_once('/').unwrap_or((size, ""));
    if raw_width.is_empty() && raw_height.is_empty() {
        return Err(QueryParameterError::new(format!(
            "GET parameter \"size\" must contain a width and/or a height (\"W\", \"/H\" or \
             \"W/H\"), is \"{}\" instead.",
            size
        )));
    }

    let width = (!raw_width.is_empty())
        .then(|| parse_dimension(raw_width, "size (width)"))
        .transpose()?;
    let height = (!raw_height.is_empty())
        .then(|| parse_dimension(raw_height, "size (height)"))
        .transpose()?;
    Ok((width, height))
}

/// Parse a dimension, round it and require an even positive value.
///
/// Even sizes are an encoder requirement (chroma subsampling of YUV 4:2:0).
fn parse_dimension(raw: &str, name: &str) -> Result<u32, QueryParameterError> {
    let value = ensure_number(raw, name)?.round();
    if value < 1.0 || value > f64::from(u32::MAX) {
        return Err(QueryParameterError::new(format!(
            "GET parameter \"{}\" must be a positive number, is {} instead.",
            name, raw
        )));
    }
    let value = value as u32;
    if value % 2 != 0 {
        return Err(QueryParameterError::new(format!(
            "GET parameter \"{}\" must be an even number; you used {} instead.",
            name, value
        )));
    }
    Ok(value)
}

fn parse_trim(trim: &str) -> Result<(Option<u64>, Option<u64>), QueryParameterError> {
    let (raw_from, raw_to) = trim.split_once('/').unwrap_or((trim, ""));
    if raw_from.is_empty() && raw_to.is_empty() {
        return Err(QueryParameterError::new(format!(
            "GET parameter \"trim\" must contain a from and/or a to time (\"from\", \"/to\" or \
             \"from/to\"), is \"{}\" instead.",
            trim
        )));
    }

    let from = (!raw_from.is_empty())
        .then(|| parse_trim_time(raw_from))
        .transpose()?;
    let to = (!raw_to.is_empty())
        .then(|| parse_trim_time(raw_to))
        .transpose()?;

    if let Some(to) = to {
        let start = from.unwrap_or(0);
        if to <= start {
            return Err(QueryParameterError::new(match from {
                Some(_) => format!(
                    "When you provide from and to for GET parameter \"trim\", the from value \
                     ({}) must be smaller than the to value ({}).",
                    raw_from, raw_to
                ),
                None => format!(
                    "GET parameter \"trim\" must end after the start of the video, is {} instead.",
                    raw_to
                ),
            }));
        }
    }

    Ok((from, to))
}

fn parse_trim_time(raw: &str) -> Result<u64, QueryParameterError> {
    parse_time_ms(raw).ok_or_else(|| {
        QueryParameterError::new(format!(
            "Could not parse time \"{}\" of GET parameter \"trim\"; use the exact format \"{}\" \
             or \"hh:mm:ss.ss\", all parts must be provided.",
            raw, TIME_FORMAT_HINT
        ))
    })
}

/// Parse a finite number or fail with a message naming the parameter.
fn ensure_number(value: &str, name: &str) -> Result<f64, QueryParameterError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            QueryParameterError::new(format!(
                "GET parameter \"{}\" must be a number, is {} instead.",
                name, value
            ))
        })
}
