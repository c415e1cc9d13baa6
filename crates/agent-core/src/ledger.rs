//! Repeated-action detection.

use std::collections::VecDeque;

use action_primitives::ActionArgs;

/// Bounded window of recent action signatures.
///
/// A signature is the action kind plus its normalized arguments, so `"google.com"` and
/// `"https://google.com"` count as the same navigation.
#[derive(Debug, Clone)]
pub struct ActionSignatureLedger {
    window: usize,
    entries: VecDeque<String>,
}

impl ActionSignatureLedger {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn signature(args: &ActionArgs) -> String {
        format!("{}:{}", args.kind(), args.clone().normalized().to_value())
    }

    /// Append a signature and return how often it now occurs within the window.
    pub fn record(&mut self, args: &ActionArgs) -> usize {
        let signature = Self::signature(args);
        if self.entries.len() == self.window {
            self.entries.pop_front();
        }
        self.entries.push_back(signature.clone());
        self.count_signature(&signature)
    }

    pub fn count(&self, args: &ActionArgs) -> usize {
        self.count_signature(&Self::signature(args))
    }

    fn count_signature(&self, signature: &str) -> usize {
        self.entries.iter().filter(|entry| *entry == signature).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
