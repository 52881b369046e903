//! Editor service: the only writer of the grid data model.
//!
//! Every operation validates its preconditions, mutates under the
//! model lock, releases the lock, then emits one [`EditEvent`]. The
//! editor knows nothing about audio or UI; syncing the engine cache and
//! refreshing screens are observer jobs.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::EditError;
use crate::model::{Launchpad, PAD_COUNT, Pad, PlaybackMode, Sample};
use crate::observer::ObserverManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditEventKind {
    PadAssigned,
    PadCleared,
    PadMoved,
    PadDuplicated,
    PadModeChanged,
    PadVolumeChanged,
    PadNameChanged,
    PadsCleared,
}

/// An applied edit. `indices` and `pads` follow per-kind conventions:
/// single-pad kinds carry one of each; `PadMoved` carries `[src, dst]`
/// with both post-mutation pads; `PadDuplicated` carries the source and
/// destination indices but only the destination pad; `PadsCleared`
/// carries every cleared index with no pads.
#[derive(Debug, Clone)]
pub struct EditEvent {
    pub kind: EditEventKind,
    pub indices: Vec<usize>,
    pub pads: Vec<Pad>,
}

pub trait EditObserver: Send + Sync {
    fn on_edit_event(&self, event: &EditEvent);
}

pub struct EditorService {
    launchpad: Arc<Mutex<Launchpad>>,
    selected: Mutex<Option<usize>>,
    clipboard: Mutex<Option<Pad>>,
    observers: ObserverManager<dyn EditObserver>,
}

impl EditorService {
    pub fn new(launchpad: Arc<Mutex<Launchpad>>) -> Self {
        Self {
            launchpad,
            selected: Mutex::new(None),
            clipboard: Mutex::new(None),
            observers: ObserverManager::new(),
        }
    }

    pub fn register_observer(&self, observer: Arc<dyn EditObserver>) {
        self.observers.register(observer);
    }

    pub fn unregister_observer(&self, observer: &Arc<dyn EditObserver>) {
        self.observers.unregister(observer);
    }

    pub fn selected_index(&self) -> Option<usize> {
        *self.selected.lock()
    }

    pub fn select_pad(&self, index: usize) -> Result<(), EditError> {
        check_index(index)?;
        *self.selected.lock() = Some(index);
        Ok(())
    }

    pub fn clear_selection(&self) {
        *self.selected.lock() = None;
    }

    pub fn has_clipboard(&self) -> bool {
        self.clipboard.lock().is_some()
    }

    /// Bind a sample file to a pad. A previously unassigned pad gets the
    /// default mode and that mode's color.
    pub fn assign_sample(&self, index: usize, path: &Path) -> Result<(), EditError> {
        check_index(index)?;
        if !path.is_file() {
            return Err(EditError::SampleNotFound(path.to_path_buf()));
        }
        let event = {
            let mut launchpad = self.launchpad.lock();
            let pad = &mut launchpad[index];
            if !pad.is_assigned() {
                pad.mode = PlaybackMode::OneShot;
                pad.color = PlaybackMode::OneShot.default_color();
            }
            pad.sample = Some(Sample::new(path));
            single_pad_event(EditEventKind::PadAssigned, index, pad)
        };
        self.emit(event);
        Ok(())
    }

    /// Unassign a pad, returning it to defaults.
    pub fn clear_pad(&self, index: usize) -> Result<(), EditError> {
        check_index(index)?;
        let event = {
            let mut launchpad = self.launchpad.lock();
            let pad = &mut launchpad[index];
            if !pad.is_assigned() {
                return Err(EditError::PadNotAssigned(index));
            }
            pad.clear_content();
            single_pad_event(EditEventKind::PadCleared, index, pad)
        };
        self.emit(event);
        Ok(())
    }

    /// Move a pad's content. With `swap`, the two pads exchange content;
    /// otherwise the destination must be unassigned and the source is
    /// left empty.
    pub fn move_pad(&self, src: usize, dst: usize, swap: bool) -> Result<(), EditError> {
        check_index(src)?;
        check_index(dst)?;
        let event = {
            let mut launchpad = self.launchpad.lock();
            if !launchpad[src].is_assigned() {
                return Err(EditError::PadNotAssigned(src));
            }
            if swap {
                let src_copy = launchpad[src].clone();
                let dst_copy = launchpad[dst].clone();
                launchpad[src].copy_content_from(&dst_copy);
                launchpad[dst].copy_content_from(&src_copy);
            } else {
                if launchpad[dst].is_assigned() {
                    return Err(EditError::PadAlreadyAssigned(dst));
                }
                let src_copy = launchpad[src].clone();
                launchpad[dst].copy_content_from(&src_copy);
                launchpad[src].clear_content();
            }
            EditEvent {
                kind: EditEventKind::PadMoved,
                indices: vec![src, dst],
                pads: vec![launchpad[src].clone(), launchpad[dst].clone()],
            }
        };
        self.emit(event);
        Ok(())
    }

    /// Copy a pad's content onto another pad.
    pub fn duplicate_pad(&self, src: usize, dst: usize, overwrite: bool) -> Result<(), EditError> {
        check_index(src)?;
        check_index(dst)?;
        let event = {
            let mut launchpad = self.launchpad.lock();
            if !launchpad[src].is_assigned() {
                return Err(EditError::PadNotAssigned(src));
            }
            if launchpad[dst].is_assigned() && !overwrite {
                return Err(EditError::PadAlreadyAssigned(dst));
            }
            let src_copy = launchpad[src].clone();
            let pad = &mut launchpad[dst];
            pad.copy_content_from(&src_copy);
            EditEvent {
                kind: EditEventKind::PadDuplicated,
                indices: vec![src, dst],
                pads: vec![pad.clone()],
            }
        };
        self.emit(event);
        Ok(())
    }

    /// Store a copy of a pad in the clipboard.
    pub fn copy_pad(&self, index: usize) -> Result<(), EditError> {
        check_index(index)?;
        let launchpad = self.launchpad.lock();
        let pad = &launchpad[index];
        if !pad.is_assigned() {
            return Err(EditError::PadNotAssigned(index));
        }
        *self.clipboard.lock() = Some(pad.clone());
        Ok(())
    }

    /// Paste the clipboard onto a pad; like a duplicate whose source is
    /// the clipboard.
    pub fn paste_pad(&self, index: usize, overwrite: bool) -> Result<(), EditError> {
        check_index(index)?;
        let clip = self
            .clipboard
            .lock()
            .clone()
            .ok_or(EditError::ClipboardEmpty)?;
        let event = {
            let mut launchpad = self.launchpad.lock();
            if launchpad[index].is_assigned() && !overwrite {
                return Err(EditError::PadAlreadyAssigned(index));
            }
            let pad = &mut launchpad[index];
            pad.copy_content_from(&clip);
            EditEvent {
                kind: EditEventKind::PadDuplicated,
                indices: vec![index],
                pads: vec![pad.clone()],
            }
        };
        self.emit(event);
        Ok(())
    }

    pub fn set_pad_mode(&self, index: usize, mode: PlaybackMode) -> Result<(), EditError> {
        check_index(index)?;
        let event = {
            let mut launchpad = self.launchpad.lock();
            let pad = &mut launchpad[index];
            if !pad.is_assigned() {
                return Err(EditError::PadNotAssigned(index));
            }
            pad.mode = mode;
            single_pad_event(EditEventKind::PadModeChanged, index, pad)
        };
        self.emit(event);
        Ok(())
    }

    pub fn set_pad_volume(&self, index: usize, volume: f32) -> Result<(), EditError> {
        check_index(index)?;
        if !(0.0..=1.0).contains(&volume) {
            return Err(crate::error::ValidationError::VolumeOutOfRange(volume).into());
        }
        let event = {
            let mut launchpad = self.launchpad.lock();
            let pad = &mut launchpad[index];
            if !pad.is_assigned() {
                return Err(EditError::PadNotAssigned(index));
            }
            pad.volume = volume;
            single_pad_event(EditEventKind::PadVolumeChanged, index, pad)
        };
        self.emit(event);
        Ok(())
    }

    pub fn set_pad_name(&self, index: usize, name: &str) -> Result<(), EditError> {
        check_index(index)?;
        let event = {
            let mut launchpad = self.launchpad.lock();
            let pad = &mut launchpad[index];
            let Some(sample) = pad.sample.as_mut() else {
                return Err(EditError::PadNotAssigned(index));
            };
            sample.display_name = name.to_string();
            single_pad_event(EditEventKind::PadNameChanged, index, pad)
        };
        self.emit(event);
        Ok(())
    }

    /// Clear every assigned pad in one operation.
    pub fn clear_all(&self) -> Result<(), EditError> {
        let event = {
            let mut launchpad = self.launchpad.lock();
            let cleared = launchpad.assigned_indices();
            for &index in &cleared {
                launchpad[index].clear_content();
            }
            EditEvent {
                kind: EditEventKind::PadsCleared,
                indices: cleared,
                pads: Vec::new(),
            }
        };
        self.emit(event);
        Ok(())
    }

    fn emit(&self, event: EditEvent) {
        self.observers.notify(|o| o.on_edit_event(&event));
    }
}

fn check_index(index: usize) -> Result<(), EditError> {
    if index < PAD_COUNT {
        Ok(())
    } else {
        Err(EditError::IndexOutOfRange(index))
    }
}

fn single_pad_event(kind: EditEventKind, index: usize, pad: &Pad) -> EditEvent {
    EditEvent {
        kind,
        indices: vec![index],
        pads: vec![pad.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::path::PathBuf;

    struct Recorder {
        events: PlMutex<Vec<EditEvent>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: PlMutex::new(Vec::new()),
            })
        }

        fn take(&self) -> Vec<EditEvent> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl EditObserver for Recorder {
        fn on_edit_event(&self, event: &EditEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn editor_with_recorder() -> (EditorService, Arc<Recorder>, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "launchsampler-editor-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let sample_path = dir.join("clap.wav");
        std::fs::write(&sample_path, b"fake").unwrap();

        let editor = EditorService::new(Arc::new(Mutex::new(Launchpad::new())));
        let recorder = Recorder::new();
        editor.register_observer(recorder.clone());
        (editor, recorder, sample_path)
    }

    #[test]
    fn test_assign_sets_defaults_and_emits() {
        let (editor, recorder, sample) = editor_with_recorder();
        editor.assign_sample(5, &sample).unwrap();

        let events = recorder.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EditEventKind::PadAssigned);
        assert_eq!(events[0].indices, vec![5]);
        let pad = &events[0].pads[0];
        assert!(pad.is_assigned());
        assert_eq!(pad.mode, PlaybackMode::OneShot);
        assert_eq!(pad.color, PlaybackMode::OneShot.default_color());
    }

    #[test]
    fn test_assign_missing_file_fails_without_event() {
        let (editor, recorder, _) = editor_with_recorder();
        let result = editor.assign_sample(0, Path::new("/nonexistent/x.wav"));
        assert!(matches!(result, Err(EditError::SampleNotFound(_))));
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_assign_out_of_range_index() {
        let (editor, _, sample) = editor_with_recorder();
        assert_eq!(
            editor.assign_sample(64, &sample),
            Err(EditError::IndexOutOfRange(64))
        );
    }

    #[test]
    fn test_reassign_keeps_existing_mode() {
        let (editor, _, sample) = editor_with_recorder();
        editor.assign_sample(3, &sample).unwrap();
        editor.set_pad_mode(3, PlaybackMode::Loop).unwrap();
        editor.assign_sample(3, &sample).unwrap();

        let launchpad = editor.launchpad.lock();
        assert_eq!(launchpad.pad(3).unwrap().mode, PlaybackMode::Loop);
    }

    #[test]
    fn test_clear_requires_assigned() {
        let (editor, recorder, sample) = editor_with_recorder();
        assert_eq!(editor.clear_pad(2), Err(EditError::PadNotAssigned(2)));

        editor.assign_sample(2, &sample).unwrap();
        recorder.take();
        editor.clear_pad(2).unwrap();
        let events = recorder.take();
        assert_eq!(events[0].kind, EditEventKind::PadCleared);
        assert!(!events[0].pads[0].is_assigned());
    }

    #[test]
    fn test_move_to_empty_pad() {
        let (editor, recorder, sample) = editor_with_recorder();
        editor.assign_sample(0, &sample).unwrap();
        editor.set_pad_volume(0, 0.25).unwrap();
        recorder.take();

        editor.move_pad(0, 9, false).unwrap();
        let events = recorder.take();
        assert_eq!(events[0].kind, EditEventKind::PadMoved);
        assert_eq!(events[0].indices, vec![0, 9]);
        assert!(!events[0].pads[0].is_assigned());
        assert!(events[0].pads[1].is_assigned());
        assert_eq!(events[0].pads[1].volume, 0.25);

        // Grid positions stay tied to the slot, not the content.
        let launchpad = editor.launchpad.lock();
        assert_eq!(launchpad.pad(9).unwrap().linear_index(), 9);
        assert!(launchpad.validate().is_ok());
    }

    #[test]
    fn test_move_to_assigned_pad_requires_swap() {
        let (editor, _, sample) = editor_with_recorder();
        editor.assign_sample(0, &sample).unwrap();
        editor.assign_sample(1, &sample).unwrap();
        assert_eq!(
            editor.move_pad(0, 1, false),
            Err(EditError::PadAlreadyAssigned(1))
        );

        editor.set_pad_volume(0, 0.1).unwrap();
        editor.set_pad_volume(1, 0.9).unwrap();
        editor.move_pad(0, 1, true).unwrap();
        let launchpad = editor.launchpad.lock();
        assert_eq!(launchpad.pad(0).unwrap().volume, 0.9);
        assert_eq!(launchpad.pad(1).unwrap().volume, 0.1);
    }

    #[test]
    fn test_duplicate_respects_overwrite() {
        let (editor, recorder, sample) = editor_with_recorder();
        editor.assign_sample(0, &sample).unwrap();
        editor.assign_sample(1, &sample).unwrap();
        recorder.take();

        assert_eq!(
            editor.duplicate_pad(0, 1, false),
            Err(EditError::PadAlreadyAssigned(1))
        );
        assert!(recorder.take().is_empty());

        editor.duplicate_pad(0, 1, true).unwrap();
        let events = recorder.take();
        assert_eq!(events[0].kind, EditEventKind::PadDuplicated);
        assert_eq!(events[0].indices, vec![0, 1]);
        assert_eq!(events[0].pads.len(), 1);
    }

    #[test]
    fn test_paste_from_clipboard() {
        let (editor, recorder, sample) = editor_with_recorder();
        assert_eq!(editor.paste_pad(4, false), Err(EditError::ClipboardEmpty));

        editor.assign_sample(0, &sample).unwrap();
        editor.copy_pad(0).unwrap();
        recorder.take();

        editor.paste_pad(4, false).unwrap();
        let events = recorder.take();
        assert_eq!(events[0].kind, EditEventKind::PadDuplicated);
        assert_eq!(events[0].indices, vec![4]);
        assert!(events[0].pads[0].is_assigned());

        // Source pad is untouched by paste.
        assert!(editor.launchpad.lock().pad(0).unwrap().is_assigned());
    }

    #[test]
    fn test_volume_validation() {
        let (editor, _, sample) = editor_with_recorder();
        editor.assign_sample(0, &sample).unwrap();
        assert!(matches!(
            editor.set_pad_volume(0, 1.5),
            Err(EditError::InvalidValue(_))
        ));
        editor.set_pad_volume(0, 0.5).unwrap();
    }

    #[test]
    fn test_clear_all_emits_every_cleared_index() {
        let (editor, recorder, sample) = editor_with_recorder();
        for i in [0, 7, 32] {
            editor.assign_sample(i, &sample).unwrap();
        }
        recorder.take();

        editor.clear_all().unwrap();
        let events = recorder.take();
        assert_eq!(events[0].kind, EditEventKind::PadsCleared);
        assert_eq!(events[0].indices, vec![0, 7, 32]);
        assert!(events[0].pads.is_empty());
        assert!(editor.launchpad.lock().assigned_indices().is_empty());
    }

    #[test]
    fn test_set_pad_name() {
        let (editor, recorder, sample) = editor_with_recorder();
        editor.assign_sample(0, &sample).unwrap();
        recorder.take();

        editor.set_pad_name(0, "Clap Tight").unwrap();
        let events = recorder.take();
        assert_eq!(events[0].kind, EditEventKind::PadNameChanged);
        assert_eq!(
            events[0].pads[0].sample.as_ref().unwrap().display_name,
            "Clap Tight"
        );
    }

    #[test]
    fn test_selection_tracking() {
        let (editor, _, _) = editor_with_recorder();
        assert_eq!(editor.selected_index(), None);
        editor.select_pad(12).unwrap();
        assert_eq!(editor.selected_index(), Some(12));
        assert!(editor.select_pad(99).is_err());
        editor.clear_selection();
        assert_eq!(editor.selected_index(), None);
    }
}
