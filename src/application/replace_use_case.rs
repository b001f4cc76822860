// ============================================================
// Layer 2 — UNK Replacement Use Case
// ============================================================
// Post-processes finished translations. The source file and
// the translation file are read in parallel and processed in
// chunks of `batch` pairs, in file order. Every ensemble member
// aligns each chunk under teacher forcing; the grids are fused
// and every UNK in a translation is rewritten from the source
// word it attends to most.
//
// Source words come from the raw source line, so words outside
// the vocabulary are still available for copying.

use anyhow::{ensure, Result};
use std::{
    io::{self, Write},
    path::PathBuf,
};

use crate::application::ensemble::Ensemble;
use crate::data::{lexicon::load_dictionary, reader::read_lines};
use crate::domain::{
    alignment::AlignmentGrid, batch::TokenBatch, fusion::FusionRule, traits::DecodingModel,
    vocabulary::VocabularyPair,
};
use crate::ml::{self, DecodeBackend};
use crate::search::unk::{Heuristic, UnkReplacer};

#[derive(Debug, Clone)]
pub struct ReplaceOptions {
    pub models:      Vec<PathBuf>,
    pub source:      PathBuf,
    pub translation: PathBuf,
    pub dictionary:  Option<PathBuf>,
    pub heuristic:   u8,
    pub batch:       usize,
    pub arithmetic:  bool,
}

pub struct ReplaceUseCase {
    options: ReplaceOptions,
}

impl ReplaceUseCase {
    pub fn new(options: ReplaceOptions) -> Self {
        Self { options }
    }

    pub fn execute(&self) -> Result<()> {
        let opts = &self.options;
        ensure!(opts.batch >= 1, "--batch must be at least 1");

        let heuristic = Heuristic::from_level(opts.heuristic)?;
        let dictionary = opts.dictionary.as_deref().map(load_dictionary).transpose()?;
        if let Some(d) = &dictionary {
            tracing::info!("Loaded {} dictionary entries", d.len());
        }

        let device = ml::device();
        let ensemble = Ensemble::<DecodeBackend>::load(&opts.models, &device)?;
        let replacer = UnkReplacer::new(heuristic, dictionary, ensemble.vocab.target.unk_symbol())?;

        let sources = read_lines(&opts.source)?;
        let translations = read_lines(&opts.translation)?;
        ensure!(
            sources.len() == translations.len(),
            "'{}' has {} lines but '{}' has {}",
            opts.source.display(), sources.len(), opts.translation.display(), translations.len()
        );

        let stdout = io::stdout();
        let mut out = stdout.lock();
        let count = replace_lines(
            &ensemble.models,
            &ensemble.vocab,
            &replacer,
            FusionRule::from_arithmetic_flag(opts.arithmetic),
            opts.batch,
            &sources,
            &translations,
            &mut out,
        )?;
        tracing::info!("Replaced UNK in {} sentences", count);
        Ok(())
    }
}

fn words(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

#[allow(clippy::too_many_arguments)]
pub fn replace_lines<D: DecodingModel, W: Write>(
    models:       &[D],
    vocab:        &VocabularyPair,
    replacer:     &UnkReplacer,
    fusion:       FusionRule,
    batch:        usize,
    sources:      &[String],
    translations: &[String],
    output:       &mut W,
) -> Result<usize> {
    let mut count = 0;
    for (src_chunk, trans_chunk) in sources.chunks(batch.max(1)).zip(translations.chunks(batch.max(1))) {
        let tokens = TokenBatch::from_lines(src_chunk, trans_chunk, vocab);
        let grids = models.iter().map(|m| m.align(&tokens)).collect::<Result<Vec<_>>>()?;
        let grid = AlignmentGrid::fuse(&grids, fusion)?;

        for (b, (source, translation)) in src_chunk.iter().zip(trans_chunk).enumerate() {
            let replaced = replacer.replace(&words(source), &words(translation), &grid, b);
            writeln!(output, "{}", replaced.join(" "))?;
        }

        count += src_chunk.len();
        tracing::debug!("{} sentences processed", count);
    }
    output.flush()?;
    Ok(count)
}
