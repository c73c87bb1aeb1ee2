//! Tract-backed subject oracle
//!
//! Runs a single-output salient-object ONNX model (for example U²-Net or
//! ISNet exports) with tract, a pure Rust inference engine, and turns its
//! prediction into the alpha channel of the returned image.

use super::{OracleFactory, SubjectOracle};
use crate::{
    error::{CutoutError, Result},
    types::PixelBuffer,
    utils::{ImagePreprocessor, PreprocessingConfig},
};
use instant::Instant;
use std::path::PathBuf;
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Oracle running an ONNX model from disk
pub struct TractOracle {
    model_path: PathBuf,
    preprocessing: PreprocessingConfig,
    model: Option<TractModel>,
}

impl TractOracle {
    #[must_use]
    pub fn new(model_path: PathBuf, input_size: u32) -> Self {
        Self {
            model_path,
            preprocessing: PreprocessingConfig::imagenet(input_size),
            model: None,
        }
    }

    fn load_model(&self) -> Result<TractModel> {
        let size = self.preprocessing.target_size as usize;
        log::info!(
            "Loading oracle model {} ({size}x{size})",
            self.model_path.display()
        );

        onnx()
            .model_for_path(&self.model_path)
            .map_err(|e| CutoutError::oracle_failed(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| CutoutError::oracle_failed(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| CutoutError::oracle_failed(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                CutoutError::oracle_failed(format!("Failed to create runnable model: {e}"))
            })
    }
}

impl std::fmt::Debug for TractOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractOracle")
            .field("model_path", &self.model_path)
            .field("input_size", &self.preprocessing.target_size)
            .field("loaded", &self.model.is_some())
            .finish()
    }
}

impl SubjectOracle for TractOracle {
    fn name(&self) -> &str {
        "tract"
    }

    fn initialize(&mut self) -> Result<()> {
        if self.model.is_some() {
            return Ok(());
        }
        if !self.model_path.is_file() {
            return Err(CutoutError::oracle_failed(format!(
                "model file not found: {}",
                self.model_path.display()
            )));
        }

        let start = Instant::now();
        self.model = Some(self.load_model()?);
        log::info!(
            "Oracle model ready in {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    fn extract(&mut self, image: &PixelBuffer) -> Result<PixelBuffer> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| CutoutError::oracle_failed("Tract model not initialized"))?;

        let (input, letterbox) = ImagePreprocessor::preprocess(image, &self.preprocessing)?;
        let size = self.preprocessing.target_size as usize;
        let values = input
            .as_slice()
            .ok_or_else(|| CutoutError::oracle_failed("input tensor is not contiguous"))?;
        let tensor = Tensor::from_shape(&[1, 3, size, size], values)
            .map_err(|e| CutoutError::oracle_failed(format!("Failed to build input tensor: {e}")))?;

        let start = Instant::now();
        let outputs = model
            .run(tvec![tensor.into()])
            .map_err(|e| CutoutError::oracle_failed(format!("Tract inference failed: {e}")))?;
        log::debug!(
            "Oracle inference completed in {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| CutoutError::oracle_failed("No output tensor found"))?
            .into_arc_tensor();
        let prediction = output
            .as_slice::<f32>()
            .map_err(|e| CutoutError::oracle_failed(format!("Unexpected output tensor: {e}")))?;

        // Multi-output models put the fused map first; use its leading plane
        let plane = prediction
            .get(..size * size)
            .ok_or_else(|| CutoutError::oracle_failed("output tensor smaller than input"))?;
        let alpha = letterbox.project_prediction(plane)?;

        let data = image
            .rgb_pixels()
            .zip(alpha)
            .flat_map(|([r, g, b], a)| [r, g, b, a])
            .collect();
        PixelBuffer::new(image.width(), image.height(), 4, data)
    }
}

/// Builds [`TractOracle`] instances for one model file
#[derive(Debug, Clone)]
pub struct TractOracleFactory {
    model_path: PathBuf,
    input_size: u32,
}

impl TractOracleFactory {
    #[must_use]
    pub fn new(model_path: PathBuf, input_size: u32) -> Self {
        Self {
            model_path,
            input_size,
        }
    }
}

impl OracleFactory for TractOracleFactory {
    fn name(&self) -> &str {
        "tract"
    }

    fn create(&self) -> Result<Box<dyn SubjectOracle>> {
        Ok(Box::new(TractOracle::new(
            self.model_path.clone(),
            self.input_size,
        )))
    }
}
