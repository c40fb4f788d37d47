use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder, DFA};

/// Levenshtein automaton for fuzzy term expansion
pub struct FuzzyAutomaton {
    /// Maximum allowed edit distance (typically 1-2)
    max_edit_distance: u8,

    dfa: DFA,
}

impl FuzzyAutomaton {
    /// Transpositions count as one edit (teh -> the)
    pub fn new(term: &str, max_edit_distance: u8) -> Self {
        let builder = LevenshteinAutomatonBuilder::new(max_edit_distance, true);
        FuzzyAutomaton {
            max_edit_distance,
            dfa: builder.build_dfa(term),
        }
    }

    /// Edit distance to `candidate` when within bounds
    pub fn distance(&self, candidate: &str) -> Option<u8> {
        let mut state = self.dfa.initial_state();
        for &byte in candidate.as_bytes() {
            state = self.dfa.transition(state, byte);
        }

        match self.dfa.distance(state) {
            Distance::Exact(d) if d <= self.max_edit_distance => Some(d),
            _ => None,
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.distance(candidate).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_edit_matches() {
        let automaton = FuzzyAutomaton::new("quick", 1);
        assert_eq!(automaton.distance("quick"), Some(0));
        assert!(automaton.matches("quack"));
        assert!(automaton.matches("qucik"));
        assert!(!automaton.matches("quacks"));
    }
}
