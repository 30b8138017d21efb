//! Streaming removal of model-internal markers.
//!
//! Gemma-family models can leak turn boundaries (`<start_of_turn>`, `<end_of_turn>`) and
//! role headers into the content stream. Markers are matched whole at exact positions;
//! text that might be the start of a marker is held back until the next chunk decides it,
//! so a marker split across chunks is still removed and "remodel" stays "remodel".

/// Markers that must never reach a visitor. Role headers are only markers when they
/// directly follow a turn boundary.
pub const DEFAULT_MARKERS: &[&str] = &[
    "<start_of_turn>model\n",
    "<start_of_turn>user\n",
    "<start_of_turn>",
    "<end_of_turn>",
    "<bos>",
    "<eos>",
];

#[derive(Debug, Clone)]
pub struct MarkerFilter {
    markers: Vec<&'static str>,
    pending: String,
}

impl Default for MarkerFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MARKERS)
    }
}

impl MarkerFilter {
    pub fn new(markers: &[&'static str]) -> Self {
        let mut markers: Vec<&'static str> = markers.iter().copied().filter(|m| !m.is_empty()).collect();
        // Longest first so a role header wins over the bare turn marker it starts with.
        markers.sort_by(|a, b| b.len().cmp(&a.len()));
        Self {
            markers,
            pending: String::new(),
        }
    }

    /// Feed one backend chunk; returns the text that is now known to be marker-free.
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        self.drain(false)
    }

    /// Flush whatever was held back once the backend is done.
    pub fn finish(&mut self) -> String {
        self.drain(true)
    }

    /// True while text is held back waiting for disambiguation.
    pub fn is_holding(&self) -> bool {
        !self.pending.is_empty()
    }

    fn drain(&mut self, at_end: bool) -> String {
        let mut out = String::with_capacity(self.pending.len());
        let mut i = 0;
        while i < self.pending.len() {
            let rest = &self.pending[i..];
            if !at_end
                && self
                    .markers
                    .iter()
                    .any(|m| m.len() > rest.len() && m.starts_with(rest))
            {
                break;
            }
            if let Some(m) = self.markers.iter().find(|m| rest.starts_with(*m)) {
                i += m.len();
                continue;
            }
            let ch = rest.chars().next().unwrap_or_default();
            out.push(ch);
            i += ch.len_utf8();
        }
        self.pending.drain(..i);
        out
    }
}
