use std::sync::Mutex;

use vpcc_bitstream::{FrameData, FrameGroup};

/// The two playback cursors, each a (frame group, frame) pair.
///
/// The decoder-feeding side reads and advances the input cursor; the
/// renderer side reads and advances the output cursor. The output cursor
/// never passes the input cursor: a frame is only presentable after its
/// packets were queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursors {
    input_group: usize,
    input_frame: usize,
    output_group: usize,
    output_frame: usize,
}

/// The parsed frame groups plus the playback position within them.
///
/// Frame groups are immutable after construction; one mutex guards the
/// cursors because the coordinator thread and the renderer thread mutate
/// them independently.
pub struct PlaybackContext {
    frame_groups: Vec<FrameGroup>,
    cursors: Mutex<Cursors>,
}

impl PlaybackContext {
    pub fn new(frame_groups: Vec<FrameGroup>) -> Self {
        Self {
            frame_groups,
            cursors: Mutex::new(Cursors::default()),
        }
    }

    pub fn frame_groups(&self) -> &[FrameGroup] {
        &self.frame_groups
    }

    /// The frame group and frame the decoders consume next.
    pub fn current_decoder_frame(&self) -> Option<(&FrameGroup, &FrameData)> {
        let cursors = self.cursors.lock().expect("cursor lock");
        self.frame_at(cursors.input_group, cursors.input_frame)
    }

    /// Moves the input cursor to the next frame, rolling over group
    /// boundaries.
    pub fn advance_decoder_frame(&self) {
        let mut cursors = self.cursors.lock().expect("cursor lock");

        if let Some(group) = self.frame_groups.get(cursors.input_group) {
            cursors.input_frame += 1;

            if cursors.input_frame >= group.frames.len() {
                cursors.input_frame = 0;
                cursors.input_group += 1;
            }
        }
    }

    /// True once every frame of every group has been fed to the decoders.
    pub fn input_eos(&self) -> bool {
        let cursors = self.cursors.lock().expect("cursor lock");
        cursors.input_group >= self.frame_groups.len()
    }

    /// The frame the renderer presents next.
    pub fn current_render_frame(&self) -> Option<(&FrameGroup, &FrameData)> {
        let cursors = self.cursors.lock().expect("cursor lock");
        self.frame_at(cursors.output_group, cursors.output_frame)
    }

    /// Moves the output cursor to the next frame.
    pub fn advance_render_frame(&self) {
        let mut cursors = self.cursors.lock().expect("cursor lock");

        if let Some(group) = self.frame_groups.get(cursors.output_group) {
            cursors.output_frame += 1;

            if cursors.output_frame >= group.frames.len() {
                cursors.output_frame = 0;
                cursors.output_group += 1;
            }
        }
    }

    /// True once every frame has been presented.
    pub fn output_eos(&self) -> bool {
        let cursors = self.cursors.lock().expect("cursor lock");
        cursors.output_group >= self.frame_groups.len()
    }

    /// Reads the current render frame and advances the output cursor in
    /// one critical section, so the presentation gate observes a
    /// consistent position.
    pub fn take_render_frame<T>(&self, f: impl FnOnce(&FrameData) -> T) -> Option<T> {
        let mut cursors = self.cursors.lock().expect("cursor lock");

        let (group, frame) = self.frame_at(cursors.output_group, cursors.output_frame)?;
        let value = f(frame);

        cursors.output_frame += 1;

        if cursors.output_frame >= group.frames.len() {
            cursors.output_frame = 0;
            cursors.output_group += 1;
        }

        Some(value)
    }

    /// Atomically rewinds both cursors to the beginning; used when
    /// playback loops.
    pub fn reset(&self) {
        let mut cursors = self.cursors.lock().expect("cursor lock");
        *cursors = Cursors::default();
    }

    /// Output cursor position is never lexicographically ahead of the
    /// input cursor.
    pub fn cursors_ordered(&self) -> bool {
        let cursors = self.cursors.lock().expect("cursor lock");

        (cursors.output_group, cursors.output_frame)
            <= (cursors.input_group, cursors.input_frame)
    }

    fn frame_at(&self, group_index: usize, frame_index: usize) -> Option<(&FrameGroup, &FrameData)> {
        let group = self.frame_groups.get(group_index)?;
        let frame = group.frames.get(frame_index)?;

        Some((group, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(group_sizes: &[usize]) -> PlaybackContext {
        let groups = group_sizes
            .iter()
            .map(|&frames| {
                let mut group = FrameGroup::default();

                group.frames = (0..frames)
                    .map(|i| FrameData {
                        index: i,
                        ..Default::default()
                    })
                    .collect();

                group
            })
            .collect();

        PlaybackContext::new(groups)
    }

    #[test]
    fn cursors_roll_over_group_boundaries() {
        let ctx = context(&[2, 1]);

        assert!(!ctx.input_eos());
        assert_eq!(ctx.current_decoder_frame().unwrap().1.index, 0);

        ctx.advance_decoder_frame();
        assert_eq!(ctx.current_decoder_frame().unwrap().1.index, 1);

        ctx.advance_decoder_frame();
        assert_eq!(ctx.current_decoder_frame().unwrap().1.index, 0);
        assert!(!ctx.input_eos());

        ctx.advance_decoder_frame();
        assert!(ctx.input_eos());
        assert!(ctx.current_decoder_frame().is_none());
    }

    #[test]
    fn empty_context_is_immediately_eos() {
        let ctx = context(&[]);

        assert!(ctx.input_eos());
        assert!(ctx.output_eos());
    }

    #[test]
    fn reset_rewinds_both_cursors() {
        let ctx = context(&[2]);

        ctx.advance_decoder_frame();
        ctx.advance_render_frame();
        ctx.advance_decoder_frame();
        ctx.advance_render_frame();

        assert!(ctx.input_eos());
        assert!(ctx.output_eos());

        ctx.reset();

        assert!(!ctx.input_eos());
        assert!(!ctx.output_eos());
        assert_eq!(ctx.current_render_frame().unwrap().1.index, 0);
    }

    #[test]
    fn output_cursor_never_passes_input_cursor_in_normal_flow() {
        let ctx = context(&[3]);

        // The coordinator advances input before the renderer presents.
        for _ in 0..3 {
            assert!(ctx.cursors_ordered());
            ctx.advance_decoder_frame();
            assert!(ctx.cursors_ordered());
            ctx.advance_render_frame();
            assert!(ctx.cursors_ordered());
        }
    }

    #[test]
    fn take_render_frame_reads_and_advances_atomically() {
        let ctx = context(&[2]);
        ctx.advance_decoder_frame();
        ctx.advance_decoder_frame();

        let index = ctx.take_render_frame(|frame| frame.index).unwrap();
        assert_eq!(index, 0);

        let index = ctx.take_render_frame(|frame| frame.index).unwrap();
        assert_eq!(index, 1);

        assert!(ctx.take_render_frame(|frame| frame.index).is_none());
        assert!(ctx.output_eos());
    }
}
