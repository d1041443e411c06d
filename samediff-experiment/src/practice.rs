use crate::error::ConfigError;
use samediff_core::{CorrectResponse, TrialRecord};
use tracing::warn;

pub const PRACTICE_ITEMS: usize = 4;

/// Where the "different" practice items came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferentSource {
    /// The first `category` record, at this list position.
    Category { position: usize },
    /// No `category` record: the first two records of the list, relabelled
    /// `different` whatever their images are.
    Positional,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PracticeSet {
    /// same, different, same, different
    pub items: Vec<TrialRecord>,
    pub different_source: DifferentSource,
}

/// Builds the four practice items from the main list.
pub fn select_practice(trials: &[TrialRecord]) -> Result<PracticeSet, ConfigError> {
    let identity = trials
        .iter()
        .find(|t| t.is_trial_type("identity"))
        .ok_or(ConfigError::MissingIdentitySeed)?;
    let same = relabel(
        TrialRecord {
            right_image: identity.left_image.clone(),
            ..identity.clone()
        },
        CorrectResponse::Same,
    );

    let (first_diff, second_diff, different_source) =
        match trials.iter().position(|t| t.is_trial_type("category")) {
            Some(position) => {
                let diff = relabel(trials[position].clone(), CorrectResponse::Different);
                (diff.clone(), diff, DifferentSource::Category { position })
            }
            None => match trials {
                [first, second, ..] => {
                    warn!(
                        "no \"category\" record in trial list; practice uses the first two records \
                         labelled \"different\", which may not actually differ"
                    );
                    (
                        relabel(first.clone(), CorrectResponse::Different),
                        relabel(second.clone(), CorrectResponse::Different),
                        DifferentSource::Positional,
                    )
                }
                _ => {
                    return Err(ConfigError::InsufficientFallback {
                        available: trials.len(),
                    });
                }
            },
        };

    Ok(PracticeSet {
        items: vec![same.clone(), first_diff, same, second_diff],
        different_source,
    })
}

fn relabel(record: TrialRecord, response: CorrectResponse) -> TrialRecord {
    TrialRecord {
        correct_response: response.as_str().to_string(),
        ..record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(img: &str) -> TrialRecord {
        TrialRecord::new(img, img, "same").with_trial_type("identity")
    }

    fn category(a: &str, b: &str) -> TrialRecord {
        TrialRecord::new(a, b, "different").with_trial_type("category")
    }

    fn labels(set: &PracticeSet) -> Vec<&str> {
        set.items.iter().map(|t| t.correct_response.as_str()).collect()
    }

    #[test]
    fn picks_first_identity_and_category() {
        let trials = vec![
            category("dog1.png", "dog2.png"),
            identity("cat1.png"),
            category("dog3.png", "dog4.png"),
            identity("cow1.png"),
        ];
        let set = select_practice(&trials).unwrap();
        assert_eq!(set.items.len(), PRACTICE_ITEMS);
        assert_eq!(labels(&set), ["same", "different", "same", "different"]);
        assert_eq!(set.different_source, DifferentSource::Category { position: 0 });

        assert_eq!(&*set.items[0].left_image, "cat1.png");
        assert_eq!(&*set.items[0].right_image, "cat1.png");
        assert_eq!(&*set.items[1].left_image, "dog1.png");
        assert_eq!(&*set.items[1].right_image, "dog2.png");
        assert_eq!(set.items[0], set.items[2]);
        assert_eq!(set.items[1], set.items[3]);
    }

    #[test]
    fn same_item_pairs_left_image_with_itself() {
        let odd = TrialRecord::new("cat1.png", "cat2.png", "different").with_trial_type("identity");
        let set = select_practice(&[odd, category("a.png", "b.png")]).unwrap();
        assert_eq!(&*set.items[0].right_image, "cat1.png");
        assert_eq!(set.items[0].correct_response, "same");
    }

    #[test]
    fn falls_back_to_first_two_records() {
        let trials = vec![identity("cat1.png"), identity("cow1.png"), identity("pig1.png")];
        let set = select_practice(&trials).unwrap();
        assert_eq!(set.different_source, DifferentSource::Positional);
        assert_eq!(labels(&set), ["same", "different", "same", "different"]);
        assert_eq!(&*set.items[1].left_image, "cat1.png");
        assert_eq!(&*set.items[3].left_image, "cow1.png");
        assert_eq!(&*set.items[3].right_image, "cow1.png");
    }

    #[test]
    fn fallback_needs_two_records() {
        let err = select_practice(&[identity("cat1.png")]).unwrap_err();
        assert_eq!(err, ConfigError::InsufficientFallback { available: 1 });
    }

    #[test]
    fn identity_seed_is_required() {
        let trials = vec![category("a.png", "b.png"), category("c.png", "d.png")];
        assert_eq!(
            select_practice(&trials).unwrap_err(),
            ConfigError::MissingIdentitySeed
        );
        assert_eq!(select_practice(&[]).unwrap_err(), ConfigError::MissingIdentitySeed);
    }
}
