use reqwest::multipart::{Form, Part as FormPart};

use crate::config::CredentialSource;
use crate::error::GenError;
use crate::request::{Blob, GenerationRequest, ParamValue};

/// Completion mode of a generation call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Artifact comes back in the submission response.
    Sync,
    /// Submission returns a job id that must be polled.
    Async,
}

impl Mode {
    pub fn accept(self) -> &'static str {
        match self {
            Mode::Sync => "image/*",
            Mode::Async => "application/json",
        }
    }
}

/// One multipart field.
#[derive(Clone, Debug, PartialEq)]
pub enum Part {
    Text { name: String, value: String },
    File { name: String, blob: Blob },
}

impl Part {
    pub fn name(&self) -> &str {
        match self {
            Part::Text { name, .. } | Part::File { name, .. } => name,
        }
    }
}

/// Everything needed to send one submission, before any I/O.
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub parts: Vec<Part>,
}

impl Payload {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name() == name)
    }

    /// Encode the parts as a multipart form. The boundary is random, so two
    /// encodings of the same payload differ only there.
    pub fn to_form(&self) -> Result<Form, GenError> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match part {
                Part::Text { name, value } => form.text(name.clone(), value.clone()),
                Part::File { name, blob } => {
                    let file_name = blob.file_name.clone().unwrap_or_else(|| name.clone());
                    let mut field = FormPart::bytes(blob.bytes.clone()).file_name(file_name);
                    if let Some(ct) = &blob.content_type {
                        field = field.mime_str(ct).map_err(|e| {
                            GenError::Validation(format!("content type of '{name}': {e}"))
                        })?;
                    }
                    form.part(name.clone(), field)
                }
            };
        }
        Ok(form)
    }
}

/// Assemble the submission payload for `endpoint` (a path such as
/// `/stable-image/generate/core`).
///
/// Field order is fixed: `image`, `mask`, `prompt`, then extra parameters in
/// insertion order. The credential is fetched from `credentials` on each
/// call.
pub fn build_payload(
    host: &str,
    endpoint: &str,
    request: &GenerationRequest,
    mode: Mode,
    credentials: &dyn CredentialSource,
) -> Result<Payload, GenError> {
    request.validate()?;

    if !endpoint.starts_with('/') {
        return Err(GenError::Validation(format!(
            "endpoint must start with '/': {endpoint}"
        )));
    }

    let api_key = credentials
        .api_key()
        .ok_or_else(|| GenError::Config("API credential not set".into()))?;

    let mut parts = Vec::with_capacity(request.params().len() + 3);
    if let Some(image) = request.image() {
        parts.push(Part::File {
            name: "image".to_string(),
            blob: image.clone(),
        });
    }
    if let Some(mask) = request.mask() {
        parts.push(Part::File {
            name: "mask".to_string(),
            blob: mask.clone(),
        });
    }
    parts.push(Part::Text {
        name: "prompt".to_string(),
        value: request.prompt().to_string(),
    });
    for (name, value) in request.params() {
        let part = match value {
            ParamValue::Blob(blob) => Part::File {
                name: name.clone(),
                blob: blob.clone(),
            },
            scalar => Part::Text {
                name: name.clone(),
                value: scalar.as_form_text().unwrap_or_default(),
            },
        };
        parts.push(part);
    }

    Ok(Payload {
        url: format!("{host}{endpoint}"),
        headers: vec![
            ("Accept".to_string(), mode.accept().to_string()),
            ("Authorization".to_string(), format!("Bearer {api_key}")),
        ],
        parts,
    })
}

/// URL and headers for one status query of `job_id`.
pub fn build_poll_request(
    host: &str,
    job_id: &str,
    credentials: &dyn CredentialSource,
) -> Result<(String, Vec<(String, String)>), GenError> {
    let api_key = credentials
        .api_key()
        .ok_or_else(|| GenError::Config("API credential not set".into()))?;
    let url = format!("{host}/results/{job_id}");
    let headers = vec![
        ("Accept".to_string(), "*/*".to_string()),
        ("Authorization".to_string(), format!("Bearer {api_key}")),
    ];
    Ok((url, headers))
}
