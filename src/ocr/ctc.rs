//! Greedy CTC decoding for PP-OCR style recognition heads.

use ndarray::ArrayView2;

/// Maps class indices to symbols. Index 0 is the CTC blank.
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    symbols: Vec<String>,
}

impl CtcDecoder {
    /// `dict` is the recognizer's character list, one symbol per entry, in
    /// model order. A trailing space symbol is appended when `use_space_char`.
    pub fn new<I, S>(dict: I, use_space_char: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut symbols = vec![String::new()];
        symbols.extend(dict.into_iter().map(Into::into));
        if use_space_char {
            symbols.push(" ".to_string());
        }
        Self { symbols }
    }

    pub fn from_dict_text(text: &str, use_space_char: bool) -> Self {
        Self::new(
            text.lines().map(|l| l.trim_end_matches('\r')).filter(|l| !l.is_empty()),
            use_space_char,
        )
    }

    /// Includes the blank.
    pub fn num_classes(&self) -> usize {
        self.symbols.len()
    }

    /// Decode one `[time, classes]` probability matrix into text and mean
    /// confidence of the emitted symbols.
    pub fn decode(&self, probs: ArrayView2<f32>) -> (String, f32) {
        let mut text = String::new();
        let mut scores = Vec::new();
        let mut prev: Option<usize> = None;

        for row in probs.outer_iter() {
            let best = row
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(idx, &p)| (idx, p));
            let Some((idx, p)) = best else { continue };

            if idx != 0 && prev != Some(idx) {
                if let Some(sym) = self.symbols.get(idx) {
                    text.push_str(sym);
                    scores.push(p);
                }
            }
            prev = Some(idx);
        }

        let confidence = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f32>() / scores.len() as f32
        };
        (text, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn one_hot(seq: &[usize], classes: usize, p: f32) -> Array2<f32> {
        let mut m = Array2::<f32>::zeros((seq.len(), classes));
        for (t, &c) in seq.iter().enumerate() {
            m[[t, c]] = p;
        }
        m
    }

    #[test]
    fn collapses_repeats_and_drops_blanks() {
        let dec = CtcDecoder::new(["登", "录"], false);
        let probs = one_hot(&[1, 1, 0, 2, 2, 0], dec.num_classes(), 0.9);
        let (text, conf) = dec.decode(probs.view());
        assert_eq!(text, "登录");
        assert!((conf - 0.9).abs() < 1e-6);
    }

    #[test]
    fn blank_separates_doubled_letters() {
        let dec = CtcDecoder::new(["o", "l"], false);
        let probs = one_hot(&[2, 2, 0, 2, 1], dec.num_classes(), 1.0);
        assert_eq!(dec.decode(probs.view()).0, "llo");
    }

    #[test]
    fn space_symbol_is_last_class() {
        let dec = CtcDecoder::from_dict_text("a\r\nb\n\n", true);
        assert_eq!(dec.num_classes(), 4);
        let probs = one_hot(&[1, 3, 2], 4, 0.8);
        assert_eq!(dec.decode(probs.view()).0, "a b");
    }

    #[test]
    fn all_blank_is_empty_with_zero_confidence() {
        let dec = CtcDecoder::new(["a"], false);
        let probs = one_hot(&[0, 0, 0], 2, 1.0);
        assert_eq!(dec.decode(probs.view()), (String::new(), 0.0));
    }
}
