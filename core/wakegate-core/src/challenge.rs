//! Recall challenge construction and verification.
//!
//! A challenge shows six file names: three the operator actually touched in
//! the previous session and three decoys from a fixed pool of plausible but
//! fake names. The operator passes by marking exactly the three real ones.
//! A challenge is built once per gate run and never regenerated on a wrong
//! answer.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;

pub const CORRECT_COUNT: usize = 3;
pub const DECOY_COUNT: usize = 3;

/// Fake names drawn for decoys. Never sourced from tracked activity.
pub const DECOY_POOL: [&str; 20] = [
    "project_plan_v2.docx",
    "api_integration_guide.pdf",
    "style_guide_v1.css",
    "deployment_config.yaml",
    "test_suite_results.json",
    "user_auth_handler.py",
    "error_tracking_service.js",
    "database_migration.sql",
    "dashboard_component.jsx",
    "employee_directory.xlsx",
    "meeting_notes_2024-12-15.md",
    "module_registry.xml",
    "team_collaboration_roadmap.pptx",
    "performance_report_2024.pdf",
    "client_project_overview.html",
    "feature_toggle_flags.json",
    "staging_environment.log",
    "qa_checklist_latest.xlsx",
    "access_logs_2024-12-20.txt",
    "legacy_codebase_review.docx",
];

/// Used when the previous session has fewer than three distinct files.
pub const PLACEHOLDER_FILES: [&str; CORRECT_COUNT] =
    ["document1.txt", "document2.txt", "document3.txt"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    correct: BTreeSet<String>,
    decoys: BTreeSet<String>,
    displayed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// The operator must mark exactly three items.
    WrongCount { selected: usize },
    Incorrect,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

impl Challenge {
    /// Builds a challenge from the previous session's file names.
    pub fn build<R, I>(previous_session: I, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
        I: IntoIterator<Item = String>,
    {
        let recent: Vec<String> = previous_session
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let pool: Vec<String> = if recent.len() < CORRECT_COUNT {
            PLACEHOLDER_FILES.iter().map(|s| s.to_string()).collect()
        } else {
            recent
        };

        let correct: BTreeSet<String> = pool
            .choose_multiple(rng, CORRECT_COUNT)
            .cloned()
            .collect();

        let decoy_candidates: Vec<&str> = DECOY_POOL
            .iter()
            .copied()
            .filter(|name| !correct.contains(*name))
            .collect();
        let decoys: BTreeSet<String> = decoy_candidates
            .choose_multiple(rng, DECOY_COUNT)
            .map(|name| name.to_string())
            .collect();

        let mut displayed: Vec<String> = correct.iter().chain(decoys.iter()).cloned().collect();
        displayed.shuffle(rng);

        Challenge {
            correct,
            decoys,
            displayed,
        }
    }

    pub fn displayed(&self) -> &[String] {
        &self.displayed
    }

    pub fn correct(&self) -> &BTreeSet<String> {
        &self.correct
    }

    pub fn decoys(&self) -> &BTreeSet<String> {
        &self.decoys
    }

    /// Checks a selection. The challenge itself is never mutated.
    pub fn verify<'a, I>(&self, selected: I) -> Verdict
    where
        I: IntoIterator<Item = &'a str>,
    {
        let selected: BTreeSet<&str> = selected.into_iter().collect();
        if selected.len() != CORRECT_COUNT {
            return Verdict::WrongCount {
                selected: selected.len(),
            };
        }
        if selected
            .iter()
            .all(|name| self.correct.contains(*name))
        {
            Verdict::Accepted
        } else {
            Verdict::Incorrect
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn recent() -> Vec<String> {
        ["f1.txt", "f2.py", "f3.docx", "f4.js"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn challenge_draws_three_real_and_three_decoys() {
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let challenge = Challenge::build(recent(), &mut rng);

            assert_eq!(challenge.correct().len(), CORRECT_COUNT);
            assert!(challenge.correct().iter().all(|f| recent().contains(f)));
            assert_eq!(challenge.decoys().len(), DECOY_COUNT);
            assert!(challenge
                .decoys()
                .iter()
                .all(|f| DECOY_POOL.contains(&f.as_str())));
            assert!(challenge.correct().is_disjoint(challenge.decoys()));

            let shown: BTreeSet<&String> = challenge.displayed().iter().collect();
            assert_eq!(challenge.displayed().len(), 6);
            assert_eq!(shown.len(), 6);
        }
    }

    #[test]
    fn short_history_falls_back_to_placeholders() {
        let mut rng = StdRng::seed_from_u64(7);
        let challenge = Challenge::build(vec!["only.txt".to_string(), "two.py".to_string()], &mut rng);

        let expected: BTreeSet<String> = PLACEHOLDER_FILES.iter().map(|s| s.to_string()).collect();
        assert_eq!(challenge.correct(), &expected);
        assert_eq!(challenge.displayed().len(), 6);
    }

    #[test]
    fn duplicate_names_count_once() {
        let mut rng = StdRng::seed_from_u64(3);
        let names = vec!["a.txt".to_string(), "a.txt".to_string(), "b.txt".to_string()];
        let challenge = Challenge::build(names, &mut rng);
        assert!(challenge.correct().contains("document1.txt"));
    }

    #[test]
    fn tracked_name_matching_a_decoy_is_never_reused_as_decoy() {
        let names: Vec<String> = ["project_plan_v2.docx", "style_guide_v1.css", "database_migration.sql"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let challenge = Challenge::build(names.clone(), &mut rng);
            assert!(challenge.correct().is_disjoint(challenge.decoys()));
            assert_eq!(challenge.displayed().len(), 6);
        }
    }

    #[test]
    fn correct_selection_in_any_order_is_accepted() {
        let mut rng = StdRng::seed_from_u64(11);
        let challenge = Challenge::build(recent(), &mut rng);
        let mut answer: Vec<&str> = challenge.correct().iter().map(String::as_str).collect();
        answer.reverse();

        let verdict = challenge.verify(answer);
        assert_eq!(verdict, Verdict::Accepted);
        assert!(verdict.is_accepted());
        assert!(!Verdict::Incorrect.is_accepted());
    }

    #[test]
    fn wrong_selections_are_rejected_without_mutation() {
        let mut rng = StdRng::seed_from_u64(5);
        let challenge = Challenge::build(recent(), &mut rng);
        let before = challenge.clone();

        let mut one_off: Vec<&str> = challenge.correct().iter().map(String::as_str).take(2).collect();
        let decoy = challenge.decoys().iter().next().unwrap();
        one_off.push(decoy);
        assert_eq!(challenge.verify(one_off), Verdict::Incorrect);

        let two: Vec<&str> = challenge.correct().iter().map(String::as_str).take(2).collect();
        assert_eq!(challenge.verify(two), Verdict::WrongCount { selected: 2 });

        let four: Vec<&str> = challenge.displayed().iter().map(String::as_str).take(4).collect();
        assert_eq!(challenge.verify(four), Verdict::WrongCount { selected: 4 });

        assert_eq!(challenge, before);
    }
}
