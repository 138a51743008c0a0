//! Restore state machine.

use serde::Serialize;
use std::fmt;

use crate::progress::ProgressPhase;

/// Phases of one restore invocation.
///
/// `Start -> Validating -> [Snapshotting] -> [Extracting] -> ParsingMetadata
/// -> ImportingCategories -> ImportingPhotos -> RestoringSettings -> Cleanup
/// -> Done`, with `Failed` reachable from every non-terminal phase.
/// Snapshotting only happens for destructive strategies and extraction
/// only for ZIP backups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestorePhase {
    Start,
    Validating,
    Snapshotting,
    Extracting,
    ParsingMetadata,
    ImportingCategories,
    ImportingPhotos,
    RestoringSettings,
    Cleanup,
    Done,
    Failed,
}

impl RestorePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RestorePhase::Done | RestorePhase::Failed)
    }

    pub fn can_transition_to(&self, next: RestorePhase) -> bool {
        use RestorePhase::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Start, Validating)
                | (Validating, Snapshotting)
                | (Validating, Extracting)
                | (Validating, ParsingMetadata)
                | (Snapshotting, Extracting)
                | (Snapshotting, ParsingMetadata)
                | (Extracting, ParsingMetadata)
                | (ParsingMetadata, ImportingCategories)
                | (ImportingCategories, ImportingPhotos)
                | (ImportingPhotos, RestoringSettings)
                | (RestoringSettings, Cleanup)
                | (Cleanup, Done)
        )
    }
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RestorePhase::Start => "starting",
            RestorePhase::Validating => "validating the backup",
            RestorePhase::Snapshotting => "saving current data",
            RestorePhase::Extracting => "extracting the archive",
            RestorePhase::ParsingMetadata => "reading backup metadata",
            RestorePhase::ImportingCategories => "importing categories",
            RestorePhase::ImportingPhotos => "importing photos",
            RestorePhase::RestoringSettings => "restoring settings",
            RestorePhase::Cleanup => "cleaning up",
            RestorePhase::Done => "done",
            RestorePhase::Failed => "failed",
        };
        f.write_str(text)
    }
}

impl ProgressPhase for RestorePhase {
    fn span(&self) -> (f64, f64) {
        match self {
            RestorePhase::Start => (0.0, 0.0),
            RestorePhase::Validating => (0.0, 10.0),
            RestorePhase::Snapshotting => (10.0, 20.0),
            RestorePhase::Extracting => (20.0, 35.0),
            RestorePhase::ParsingMetadata => (35.0, 40.0),
            RestorePhase::ImportingCategories => (40.0, 50.0),
            RestorePhase::ImportingPhotos => (50.0, 90.0),
            RestorePhase::RestoringSettings => (90.0, 95.0),
            RestorePhase::Cleanup => (95.0, 100.0),
            RestorePhase::Done => (100.0, 100.0),
            // Failure keeps no meaningful position.
            RestorePhase::Failed => (0.0, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RestorePhase::*;

    #[test]
    fn test_happy_paths() {
        let zip_replace = [
            Start,
            Validating,
            Snapshotting,
            Extracting,
            ParsingMetadata,
            ImportingCategories,
            ImportingPhotos,
            RestoringSettings,
            Cleanup,
            Done,
        ];
        assert!(zip_replace.windows(2).all(|w| w[0].can_transition_to(w[1])));

        let json_merge = [Start, Validating, ParsingMetadata, ImportingCategories];
        assert!(json_merge.windows(2).all(|w| w[0].can_transition_to(w[1])));
    }

    #[test]
    fn test_photos_never_precede_categories() {
        assert!(!ParsingMetadata.can_transition_to(ImportingPhotos));
        assert!(!ImportingPhotos.can_transition_to(ImportingCategories));
    }

    #[test]
    fn test_failed_reachable_until_terminal() {
        assert!(ImportingPhotos.can_transition_to(Failed));
        assert!(Start.can_transition_to(Failed));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
        assert!(Done.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_display_reads_as_activity() {
        assert_eq!(ImportingPhotos.to_string(), "importing photos");
    }
}
