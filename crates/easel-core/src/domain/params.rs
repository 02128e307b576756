//! Typed generation parameters.
//!
//! Clients submit loosely structured JSON; the known surface is typed per
//! task kind and validated once at admission. Unrecognised fields are kept in
//! a flattened map so a stored task round-trips byte-for-byte — the engine
//! behind the scheduler may understand more keys than the core does.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::TaskKind;
use crate::error::SchedulerError;

/// Sampler names accepted at admission.
pub const SAMPLERS: &[&str] = &[
    "Euler a",
    "Euler",
    "LMS",
    "Heun",
    "DPM2",
    "DPM2 a",
    "DPM++ 2S a",
    "DPM++ 2M",
    "DPM++ SDE",
    "DPM++ 2M SDE",
    "DDIM",
    "PLMS",
    "UniPC",
];

fn default_sampler() -> String {
    SAMPLERS[0].to_owned()
}

fn default_seed() -> i64 {
    -1
}

fn default_steps() -> u32 {
    20
}

fn default_cfg_scale() -> f64 {
    7.0
}

fn default_dim() -> u32 {
    512
}

fn default_batch_size() -> u32 {
    1
}

fn default_denoising_strength() -> f64 {
    0.75
}

/// Parameters for a text-to-image task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Txt2ImgParams {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    /// `-1` asks the engine to pick a random seed.
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default = "default_sampler")]
    pub sampler_name: String,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f64,
    #[serde(default = "default_dim")]
    pub width: u32,
    #[serde(default = "default_dim")]
    pub height: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Checkpoint hash override; the engine's current checkpoint when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    /// VAE override; the engine's current VAE when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vae: Option<String>,
    /// Fields the core does not interpret but must round-trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters for an image-to-image task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Img2ImgParams {
    #[serde(flatten)]
    pub base: Txt2ImgParams,
    /// Source images (base64). At least one is required.
    #[serde(default)]
    pub init_images: Vec<String>,
    #[serde(default = "default_denoising_strength")]
    pub denoising_strength: f64,
}

/// Generation parameters, shaped by the owning task's kind.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TaskParams {
    Txt2Img(Txt2ImgParams),
    Img2Img(Img2ImgParams),
}

impl TaskParams {
    /// Parse and validate a raw params payload for the given kind.
    ///
    /// This is the single admission gate: everything stored in a task record
    /// has passed through here, so later re-parses of stored params are
    /// expected to succeed.
    pub fn parse(kind: TaskKind, mut value: Value) -> Result<Self, SchedulerError> {
        if let Value::Object(obj) = &mut value {
            // Older clients send the sampler under its legacy key.
            if !obj.contains_key("sampler_name")
                && let Some(sampler) = obj.remove("sampler_index")
            {
                obj.insert("sampler_name".to_owned(), sampler);
            }
        }
        let params = match kind {
            TaskKind::Txt2Img => {
                serde_json::from_value::<Txt2ImgParams>(value).map(TaskParams::Txt2Img)
            }
            TaskKind::Img2Img => {
                serde_json::from_value::<Img2ImgParams>(value).map(TaskParams::Img2Img)
            }
        }
        .map_err(|e| SchedulerError::validation(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            TaskParams::Txt2Img(_) => TaskKind::Txt2Img,
            TaskParams::Img2Img(_) => TaskKind::Img2Img,
        }
    }

    /// The fields shared by every task kind.
    pub fn common(&self) -> &Txt2ImgParams {
        match self {
            TaskParams::Txt2Img(p) => p,
            TaskParams::Img2Img(p) => &p.base,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Apply a partial patch over the serialized form and re-validate.
    ///
    /// Patch keys replace stored keys wholesale; the kind cannot change.
    pub fn merged_with(&self, patch: &Map<String, Value>) -> Result<TaskParams, SchedulerError> {
        let mut value = self.to_value();
        if let Value::Object(obj) = &mut value {
            for (key, patched) in patch {
                obj.insert(key.clone(), patched.clone());
            }
        }
        TaskParams::parse(self.kind(), value)
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        let common = self.common();
        if common.prompt.trim().is_empty() {
            return Err(SchedulerError::validation("prompt must not be empty"));
        }
        if !SAMPLERS.contains(&common.sampler_name.as_str()) {
            return Err(SchedulerError::validation(format!(
                "unknown sampler: {}",
                common.sampler_name
            )));
        }
        if !(1..=150).contains(&common.steps) {
            return Err(SchedulerError::validation(format!(
                "steps must be in 1..=150, got {}",
                common.steps
            )));
        }
        for (label, dim) in [("width", common.width), ("height", common.height)] {
            if !(64..=2048).contains(&dim) || dim % 8 != 0 {
                return Err(SchedulerError::validation(format!(
                    "{label} must be a multiple of 8 in 64..=2048, got {dim}"
                )));
            }
        }
        if common.batch_size == 0 {
            return Err(SchedulerError::validation("batch_size must be at least 1"));
        }
        if let TaskParams::Img2Img(p) = self {
            if p.init_images.is_empty() {
                return Err(SchedulerError::validation(
                    "img2img requires at least one init image",
                ));
            }
            if !(0.0..=1.0).contains(&p.denoising_strength) {
                return Err(SchedulerError::validation(format!(
                    "denoising_strength must be in 0.0..=1.0, got {}",
                    p.denoising_strength
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn txt2img_defaults_applied() {
        let params =
            TaskParams::parse(TaskKind::Txt2Img, json!({"prompt": "a lighthouse"})).unwrap();
        let common = params.common();
        assert_eq!(common.sampler_name, "Euler a");
        assert_eq!(common.steps, 20);
        assert_eq!(common.width, 512);
        assert_eq!(common.seed, -1);
    }

    #[test]
    fn unknown_sampler_is_rejected() {
        let err = TaskParams::parse(
            TaskKind::Txt2Img,
            json!({"prompt": "x", "sampler_name": "Warp Drive"}),
        )
        .unwrap_err();
        assert!(matches!(err, SchedulerError::Validation { .. }));
        assert!(err.to_string().contains("unknown sampler"));
    }

    #[test]
    fn legacy_sampler_key_accepted() {
        let params = TaskParams::parse(
            TaskKind::Txt2Img,
            json!({"prompt": "x", "sampler_index": "DDIM"}),
        )
        .unwrap();
        assert_eq!(params.common().sampler_name, "DDIM");
    }

    #[test]
    fn img2img_requires_init_images() {
        let err = TaskParams::parse(TaskKind::Img2Img, json!({"prompt": "x"})).unwrap_err();
        assert!(err.to_string().contains("init image"));

        let ok = TaskParams::parse(
            TaskKind::Img2Img,
            json!({"prompt": "x", "init_images": ["aGk="]}),
        )
        .unwrap();
        assert_eq!(ok.kind(), TaskKind::Img2Img);
    }

    #[test]
    fn bad_dimensions_are_rejected() {
        let err =
            TaskParams::parse(TaskKind::Txt2Img, json!({"prompt": "x", "width": 500})).unwrap_err();
        assert!(err.to_string().contains("width"));
    }

    #[test]
    fn unknown_fields_round_trip() {
        let params = TaskParams::parse(
            TaskKind::Txt2Img,
            json!({"prompt": "x", "hires_fix": true, "tiling": false}),
        )
        .unwrap();
        let value = params.to_value();
        assert_eq!(value["hires_fix"], true);
        assert_eq!(value["tiling"], false);
    }

    #[test]
    fn merge_patches_and_revalidates() {
        let params = TaskParams::parse(TaskKind::Txt2Img, json!({"prompt": "x"})).unwrap();

        let mut patch = Map::new();
        patch.insert("steps".into(), json!(40));
        patch.insert("checkpoint".into(), json!("deadbeef"));
        let merged = params.merged_with(&patch).unwrap();
        assert_eq!(merged.common().steps, 40);
        assert_eq!(merged.common().checkpoint.as_deref(), Some("deadbeef"));

        let mut bad = Map::new();
        bad.insert("sampler_name".into(), json!("nope"));
        assert!(params.merged_with(&bad).is_err());
    }
}
