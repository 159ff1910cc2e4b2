//! BERT-based embedder backed by `candle`, generalized from the same
//! tokenize → forward → mean-pool → L2-normalize pipeline, parameterized by
//! model repo and output dimension instead of a hardcoded Portuguese
//! BERTimbau checkpoint.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::api::sync::Api;
use tokenizers::Tokenizer;
use tracing::info;

use crate::error::EmbedError;

use super::{l2_normalize, Embedder};

/// Candle's Metal backend lacks layer-norm support for BERT as of the
/// version pinned here; CPU is used unconditionally, mirroring the same
/// documented choice in the source material's embedder.
fn device() -> Device {
    Device::Cpu
}

pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl CandleEmbedder {
    /// Download and load a BERT encoder from the HuggingFace Hub.
    ///
    /// `repo_id` should name a sentence-embedding-capable BERT checkpoint;
    /// the reference configuration uses a 384-dim MiniLM-class model
    /// (spec.md §4.3's "384 is the reference choice"), unlike the source
    /// material's 768-dim `neuralmind/bert-base-portuguese-cased`.
    pub fn load(repo_id: &str, dim: usize) -> anyhow::Result<Self> {
        info!(repo_id, dim, "loading embedding model from HuggingFace Hub");
        let api = Api::new()?;
        let repo = api.model(repo_id.to_string());

        let config_path = repo.get("config.json")?;
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(config_path)?)?;

        let tokenizer_path = repo.get("tokenizer.json")?;
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| anyhow::anyhow!("{e}"))?;

        let device = device();
        let weights_path = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))?;
        let vb = if weights_path.extension().and_then(|s| s.to_str()) == Some("safetensors") {
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)? }
        } else {
            VarBuilder::from_pth(&weights_path, DTYPE, &device)?
        };

        let model = BertModel::load(vb, &config)?;

        Ok(Self { model, tokenizer, device, dim })
    }

    fn forward_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

        let mut all_ids = Vec::with_capacity(texts.len());
        let mut all_types = Vec::with_capacity(texts.len());
        let mut all_masks = Vec::with_capacity(texts.len());

        for enc in &encodings {
            let mut ids = enc.get_ids().to_vec();
            let mut types = enc.get_type_ids().to_vec();
            let mut mask = enc.get_attention_mask().to_vec();
            ids.resize(max_len, 0);
            types.resize(max_len, 0);
            mask.resize(max_len, 0);
            all_ids.push(ids);
            all_types.push(types);
            all_masks.push(mask);
        }

        let batch = texts.len();
        let ids_flat: Vec<u32> = all_ids.into_iter().flatten().collect();
        let types_flat: Vec<u32> = all_types.into_iter().flatten().collect();
        let mask_flat: Vec<u32> = all_masks.into_iter().flatten().collect();

        let input_ids = Tensor::from_vec(ids_flat, (batch, max_len), &self.device)?;
        let token_type_ids = Tensor::from_vec(types_flat, (batch, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask_flat, (batch, max_len), &self.device)?.to_dtype(DType::F32)?;

        let output = self.model.forward(&input_ids, &token_type_ids, None)?;

        // Mean pooling weighted by the attention mask.
        let mask_expanded = attention_mask.unsqueeze(2)?.broadcast_as(output.shape())?;
        let masked = (output * &mask_expanded)?;
        let summed = masked.sum(1)?;
        let counts = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;
        let pooled = summed.broadcast_div(&counts)?;

        let mut result = Vec::with_capacity(batch);
        for i in 0..batch {
            let mut v: Vec<f32> = pooled.get(i)?.to_vec1()?;
            v.truncate(self.dim);
            l2_normalize(&mut v);
            result.push(v);
        }
        Ok(result)
    }
}

impl Embedder for CandleEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.forward_batch(texts).map_err(|e| EmbedError::ModelUnavailable(e.to_string()))
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
