//! Candle-backed cross-encoder, grounded on the same load/forward shape as
//! [`crate::embed::candle_embedder::CandleEmbedder`]: download from the Hub,
//! tokenize a `(query, chunk)` pair jointly (the tokenizer's built-in
//! sequence-pair encoding, unlike the embedder's single-sequence encoding),
//! run one BERT forward pass, and read a scalar relevance score off the
//! `[CLS]` token through a linear classification head.

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::api::sync::Api;
use tokenizers::Tokenizer;
use tracing::info;

use crate::error::EmbedError;
use crate::query::rerank::Reranker;

fn device() -> Device {
    Device::Cpu
}

pub struct CandleCrossEncoder {
    model: BertModel,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
}

impl CandleCrossEncoder {
    /// `repo_id` should name a sequence-pair relevance checkpoint (e.g. an
    /// MS MARCO cross-encoder) carrying a `classifier.weight`/`classifier.bias`
    /// pair alongside the base BERT weights.
    pub fn load(repo_id: &str) -> anyhow::Result<Self> {
        info!(repo_id, "loading cross-encoder model from HuggingFace Hub");
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

        let model = BertModel::load(vb.pp("bert"), &config)?;
        let classifier = candle_nn::linear(config.hidden_size, 1, vb.pp("classifier"))?;

        Ok(Self { model, classifier, tokenizer, device })
    }

    fn forward_pair(&self, query: &str, chunk_text: &str) -> anyhow::Result<f32> {
        let encoding = self
            .tokenizer
            .encode((query.to_string(), chunk_text.to_string()), true)
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        let ids = encoding.get_ids();
        let types = encoding.get_type_ids();
        let mask = encoding.get_attention_mask();

        let input_ids = Tensor::from_vec(ids.to_vec(), (1, ids.len()), &self.device)?;
        let token_type_ids = Tensor::from_vec(types.to_vec(), (1, types.len()), &self.device)?;
        let attention_mask = Tensor::from_vec(mask.to_vec(), (1, mask.len()), &self.device)?.to_dtype(DType::F32)?;

        let output = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let cls = output.i((.., 0, ..))?;
        let logit = self.classifier.forward(&cls)?;
        let score: f32 = logit.flatten_all()?.to_vec1::<f32>()?[0];

        // Sigmoid maps the classification logit into [0, 1] relevance.
        Ok(1.0 / (1.0 + (-score).exp()))
    }
}

impl Reranker for CandleCrossEncoder {
    fn score(&self, query: &str, chunk_text: &str) -> Result<f32, EmbedError> {
        self.forward_pair(query, chunk_text)
            .map_err(|e| EmbedError::ModelUnavailable(e.to_string()))
    }
}
