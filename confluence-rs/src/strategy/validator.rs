//! Confluence validation of entry signals

use crate::patterns::PatternLibrary;
use crate::strategy::{EntrySignal, RejectReason};
use tracing::{debug, info};

/// Passes a signal only when at least one pattern model confirms it
pub struct SignalValidator {
    library: PatternLibrary,
}

impl SignalValidator {
    pub fn new(library: PatternLibrary) -> Self {
        Self { library }
    }

    /// Run every enabled detector against `signal`.
    ///
    /// Nothing is consumed here; call [`SignalValidator::commit`] once the
    /// trade is actually open.
    pub fn validate(&self, signal: EntrySignal) -> Result<EntrySignal, RejectReason> {
        let confirmations = self.library.confirmations(&signal);
        if confirmations.is_empty() {
            debug!(
                symbol = %signal.symbol,
                direction = %signal.direction,
                entry = signal.entry_price,
                "no pattern model confirmed the candidate"
            );
            return Err(RejectReason::NoPatternConfluence);
        }

        info!(
            symbol = %signal.symbol,
            direction = %signal.direction,
            models = ?confirmations,
            "signal confirmed by pattern confluence"
        );
        Ok(signal.with_confirmations(confirmations))
    }

    /// Use up the candidates that confirmed a traded signal
    pub fn commit(&mut self, signal: &EntrySignal) {
        self.library.commit(signal);
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut PatternLibrary {
        &mut self.library
    }
}
