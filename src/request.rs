use std::fmt;

use crate::error::GenError;

/// Parameter names with dedicated slots on [`GenerationRequest`].
pub const RESERVED_PARAMS: [&str; 3] = ["prompt", "image", "mask"];

/// Binary input attached to a request as a file part.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
            content_type: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

// Blobs can be megabytes of image data; print the size instead.
impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("len", &self.bytes.len())
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Blob(Blob),
}

impl ParamValue {
    /// Form-field text for scalar values, `None` for blobs.
    pub fn as_form_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Integer(n) => Some(n.to_string()),
            Self::Float(x) => Some(x.to_string()),
            Self::Blob(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Blob> for ParamValue {
    fn from(v: Blob) -> Self {
        Self::Blob(v)
    }
}

/// One generation call's inputs. Built once through [`GenerationRequestBuilder`]
/// and read-only afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    image: Option<Blob>,
    mask: Option<Blob>,
    params: Vec<(String, ParamValue)>,
}

impl GenerationRequest {
    pub fn builder(prompt: impl Into<String>) -> GenerationRequestBuilder {
        GenerationRequestBuilder {
            prompt: prompt.into(),
            image: None,
            mask: None,
            params: Vec::new(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn image(&self) -> Option<&Blob> {
        self.image.as_ref()
    }

    pub fn mask(&self) -> Option<&Blob> {
        self.mask.as_ref()
    }

    /// Extra parameters in insertion order.
    pub fn params(&self) -> &[(String, ParamValue)] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// The prompt is the one field the service cannot do without.
    pub fn validate(&self) -> Result<(), GenError> {
        if self.prompt.trim().is_empty() {
            return Err(GenError::Validation("prompt is required".into()));
        }
        Ok(())
    }
}

pub struct GenerationRequestBuilder {
    prompt: String,
    image: Option<Blob>,
    mask: Option<Blob>,
    params: Vec<(String, ParamValue)>,
}

impl GenerationRequestBuilder {
    pub fn image(mut self, image: Blob) -> Self {
        self.image = Some(image);
        self
    }

    pub fn mask(mut self, mask: Blob) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Set a free-form parameter. Setting the same name twice keeps the
    /// first position and the last value.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    pub fn build(self) -> Result<GenerationRequest, GenError> {
        if let Some((name, _)) = self
            .params
            .iter()
            .find(|(k, _)| RESERVED_PARAMS.contains(&k.as_str()))
        {
            return Err(GenError::Validation(format!(
                "'{name}' has a dedicated field and cannot be passed as a parameter"
            )));
        }
        if self.params.iter().any(|(k, _)| k.trim().is_empty()) {
            return Err(GenError::Validation("parameter name must not be empty".into()));
        }

        let request = GenerationRequest {
            prompt: self.prompt,
            image: self.image,
            mask: self.mask,
            params: self.params,
        };
        request.validate()?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prompt_fails_validation() {
        for prompt in ["", "   ", "\n\t"] {
            let err = GenerationRequest::builder(prompt).build().unwrap_err();
            assert!(matches!(err, GenError::Validation(_)), "prompt {prompt:?}");
        }
    }

    #[test]
    fn reserved_names_rejected_as_params() {
        for name in RESERVED_PARAMS {
            let err = GenerationRequest::builder("a cat")
                .param(name, "x")
                .build()
                .unwrap_err();
            assert!(matches!(err, GenError::Validation(_)), "param {name}");
        }
    }

    #[test]
    fn repeated_param_keeps_position_and_last_value() {
        let req = GenerationRequest::builder("a cat")
            .param("seed", 1i64)
            .param("output_format", "png")
            .param("seed", 7i64)
            .build()
            .unwrap();
        let names: Vec<&str> = req.params().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["seed", "output_format"]);
        assert_eq!(req.param("seed"), Some(&ParamValue::Integer(7)));
    }

    #[test]
    fn scalar_form_text() {
        assert_eq!(ParamValue::from(0.5).as_form_text().as_deref(), Some("0.5"));
        assert_eq!(ParamValue::from(42u32).as_form_text().as_deref(), Some("42"));
        assert_eq!(ParamValue::from(Blob::new(vec![1, 2])).as_form_text(), None);
    }

    #[test]
    fn blob_debug_hides_bytes() {
        let debug = format!("{:?}", Blob::new(vec![0xAB; 4096]).with_file_name("in.png"));
        assert!(debug.contains("len: 4096"));
        assert!(debug.len() < 200);
    }
}
