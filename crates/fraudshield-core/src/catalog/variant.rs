//! Model variant metadata

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Precision/quantization profiles of the ONNX weight files a preset can ship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelVariant {
    /// Full precision baseline
    #[serde(rename = "model.onnx")]
    FullPrecision,
    /// 4-bit BitsAndBytes quantization
    #[serde(rename = "model_bnb4.onnx")]
    Bnb4,
    /// Half precision
    #[serde(rename = "model_fp16.onnx")]
    Fp16,
    /// INT8 quantization
    #[serde(rename = "model_int8.onnx")]
    Int8,
    /// 4-bit quantization
    #[serde(rename = "model_q4.onnx")]
    Q4,
    /// Mixed 4-bit with fp16
    #[serde(rename = "model_q4f16.onnx")]
    Q4F16,
    /// Generic quantization
    #[serde(rename = "model_quantized.onnx")]
    Quantized,
    /// Unsigned INT8 quantization
    #[serde(rename = "model_uint8.onnx")]
    Uint8,
}

impl ModelVariant {
    /// Weight-file name within a preset's remote repository and local cache
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::FullPrecision => "model.onnx",
            Self::Bnb4 => "model_bnb4.onnx",
            Self::Fp16 => "model_fp16.onnx",
            Self::Int8 => "model_int8.onnx",
            Self::Q4 => "model_q4.onnx",
            Self::Q4F16 => "model_q4f16.onnx",
            Self::Quantized => "model_quantized.onnx",
            Self::Uint8 => "model_uint8.onnx",
        }
    }

    /// Human-readable name shown in the variant picker
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::FullPrecision => "Full precision baseline",
            Self::Bnb4 => "4-bit quant using BitsAndBytes",
            Self::Fp16 => "Half precision",
            Self::Int8 => "INT8 quantized",
            Self::Q4 => "4-bit quantized",
            Self::Q4F16 => "Mixed 4-bit with fp16",
            Self::Quantized => "Generic quantized",
            Self::Uint8 => "Unsigned INT8 quantized",
        }
    }

    /// All variants the application knows how to acquire
    pub fn all() -> &'static [ModelVariant] {
        &[
            Self::FullPrecision,
            Self::Bnb4,
            Self::Fp16,
            Self::Int8,
            Self::Q4,
            Self::Q4F16,
            Self::Quantized,
            Self::Uint8,
        ]
    }
}

impl FromStr for ModelVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|v| v.file_name() == s)
            .ok_or_else(|| Error::UnknownVariant(s.to_string()))
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_file_name() {
        for variant in ModelVariant::all() {
            let parsed: ModelVariant = variant.file_name().parse().unwrap();
            assert_eq!(parsed, *variant);
        }
    }

    #[test]
    fn rejects_unknown_file_name() {
        let err = "model_fp32.onnx".parse::<ModelVariant>().unwrap_err();
        assert!(matches!(err, Error::UnknownVariant(_)));
    }

    #[test]
    fn serde_uses_file_names() {
        let json = serde_json::to_string(&ModelVariant::Q4F16).unwrap();
        assert_eq!(json, "\"model_q4f16.onnx\"");
        let back: ModelVariant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ModelVariant::Q4F16);
    }

    #[test]
    fn covers_the_eight_shipped_profiles() {
        assert_eq!(ModelVariant::all().len(), 8);
    }
}
