//! Buffer pipeline engine.
//!
//! A [`BufferChain`] owns every buffer a chain of 1 bpp operations needs:
//! the source/destination pair and, once a stage has to preserve a result,
//! one spare. Buffers live in a small arena and the roles are arena indices,
//! so handing a stage's output to the next stage is an index swap.
//! Everything is released together when the chain is dropped.

use crate::error::{AccelError, AccelResult};
use crate::ops::variant::MorphPass;
use crate::pix::{Colormap, Pix, Rect};

/// Device access declared for a buffer at allocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Whether a chain's final result is read back to host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostCopy {
    #[default]
    Yes,
    No,
}

/// Shape of a 1 bpp image as seen by the kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub wpl: u32,
}

impl Geometry {
    pub fn of(pix: &Pix) -> Self {
        Self {
            width: pix.width(),
            height: pix.height(),
            wpl: pix.wpl(),
        }
    }

    #[inline]
    pub fn words(&self) -> usize {
        self.wpl as usize * self.height as usize
    }
}

/// The primitives a backend provides to the morphology library.
///
/// Work submitted through one executor is ordered; `download` and
/// `synchronize` block until everything submitted before them finished.
pub trait KernelExecutor {
    type Buffer;

    fn name(&self) -> &str;

    /// Buffer holding a copy of (or aliasing) the pixels of `pix`.
    fn upload(&self, pix: &Pix, access: BufferAccess) -> AccelResult<Self::Buffer>;

    /// Zeroed buffer of `words` words. `host_mapped` asks for a buffer the
    /// host can map directly for the terminal read-back.
    fn allocate(&self, words: usize, access: BufferAccess, host_mapped: bool) -> AccelResult<Self::Buffer>;

    /// Overwrite an existing buffer with the pixels of `pix`.
    fn write(&self, buffer: &mut Self::Buffer, pix: &Pix) -> AccelResult<()>;

    fn morph_pass(
        &self,
        pass: &MorphPass,
        geometry: &Geometry,
        src: &Self::Buffer,
        dst: &mut Self::Buffer,
    ) -> AccelResult<()>;

    /// `dst = a & !b`, word by word.
    fn subtract(&self, geometry: &Geometry, a: &Self::Buffer, b: &Self::Buffer, dst: &mut Self::Buffer) -> AccelResult<()>;

    /// `a &= !b`, word by word.
    fn subtract_in_place(&self, geometry: &Geometry, a: &mut Self::Buffer, b: &Self::Buffer) -> AccelResult<()>;

    fn copy(&self, geometry: &Geometry, src: &Self::Buffer, dst: &mut Self::Buffer) -> AccelResult<()>;

    fn download(&self, geometry: &Geometry, buffer: &Self::Buffer) -> AccelResult<Vec<u32>>;

    fn synchronize(&self) -> AccelResult<()>;

    /// Whether the backend has a fast histogram/threshold kernel for this
    /// depth and channel count.
    fn supports_channels(&self, depth: u32, channels: usize) -> bool;

    /// `256 * channels` bins, channel-major.
    fn histogram_rect(&self, pix: &Pix, channels: usize, rect: Rect) -> AccelResult<Vec<u32>>;

    fn threshold_rect(&self, pix: &Pix, rect: Rect, thresholds: &[i32], hi_values: &[i32]) -> AccelResult<Pix>;

    /// TIFF-order ABGR words to an RGBA `Pix`.
    fn compose_rgb(&self, abgr: &[u32], width: u32, height: u32) -> AccelResult<Pix>;
}

/// Arena of up to three buffers with source/destination/spare roles.
pub struct BufferChain<'e, E: KernelExecutor> {
    exec: &'e E,
    geometry: Geometry,
    colormap: Option<Colormap>,
    slots: Vec<E::Buffer>,
    source: usize,
    dest: usize,
    spare: Option<usize>,
}

impl<'e, E: KernelExecutor> BufferChain<'e, E> {
    /// Stage `pix` as the source and allocate the destination.
    pub fn new(exec: &'e E, pix: &Pix) -> AccelResult<Self> {
        if pix.depth() != 1 {
            return Err(AccelError::UnsupportedDepth {
                op: "morphology",
                depth: pix.depth(),
            });
        }
        let geometry = Geometry::of(pix);
        let words = geometry.words().max(1);
        let source = exec.upload(pix, BufferAccess::ReadWrite)?;
        let dest = exec.allocate(words, BufferAccess::ReadWrite, true)?;
        log::trace!(
            "{}: chain for {}x{} ({} words)",
            exec.name(),
            geometry.width,
            geometry.height,
            words
        );
        Ok(Self {
            exec,
            geometry,
            colormap: pix.colormap().cloned(),
            slots: vec![source, dest],
            source: 0,
            dest: 1,
            spare: None,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Number of buffers currently owned by the chain.
    pub fn buffer_count(&self) -> usize {
        self.slots.len()
    }

    pub fn has_spare(&self) -> bool {
        self.spare.is_some()
    }

    /// Arena indices of (source, destination).
    pub fn roles(&self) -> (usize, usize) {
        (self.source, self.dest)
    }

    fn swap_roles(&mut self) {
        std::mem::swap(&mut self.source, &mut self.dest);
    }

    /// Run one pass from source into destination; its output becomes the
    /// new source.
    pub fn apply(&mut self, pass: &MorphPass) -> AccelResult<()> {
        let exec = self.exec;
        let geometry = self.geometry;
        let (src, dst) = read_write(&mut self.slots, self.source, self.dest);
        exec.morph_pass(pass, &geometry, src, dst)?;
        self.swap_roles();
        Ok(())
    }

    fn spare_slot(&mut self) -> AccelResult<usize> {
        if let Some(index) = self.spare {
            return Ok(index);
        }
        let buffer = self
            .exec
            .allocate(self.geometry.words().max(1), BufferAccess::ReadWrite, false)?;
        self.slots.push(buffer);
        let index = self.slots.len() - 1;
        self.spare = Some(index);
        Ok(index)
    }

    fn require_spare(&self) -> AccelResult<usize> {
        self.spare
            .ok_or_else(|| AccelError::InvalidArgument("chain has no spare buffer".into()))
    }

    /// Preserve the current result in the spare buffer.
    pub fn save_to_spare(&mut self) -> AccelResult<()> {
        let spare = self.spare_slot()?;
        let exec = self.exec;
        let geometry = self.geometry;
        let (src, dst) = read_write(&mut self.slots, self.source, spare);
        exec.copy(&geometry, src, dst)
    }

    /// Make the spare buffer's contents the current result again.
    pub fn restore_from_spare(&mut self) -> AccelResult<()> {
        let spare = self.require_spare()?;
        let exec = self.exec;
        let geometry = self.geometry;
        let (src, dst) = read_write(&mut self.slots, spare, self.source);
        exec.copy(&geometry, src, dst)
    }

    /// Stage a second operand of identical geometry in the spare buffer.
    pub fn load_spare(&mut self, pix: &Pix) -> AccelResult<()> {
        if Geometry::of(pix) != self.geometry || pix.depth() != 1 {
            return Err(AccelError::GeometryMismatch(format!(
                "operand is {}x{}x{}, chain is {}x{}x1",
                pix.width(),
                pix.height(),
                pix.depth(),
                self.geometry.width,
                self.geometry.height
            )));
        }
        let spare = self.spare_slot()?;
        self.exec.write(&mut self.slots[spare], pix)
    }

    /// Current result minus the spare: `source & !spare`.
    pub fn subtract_spare(&mut self) -> AccelResult<()> {
        let spare = self.require_spare()?;
        let exec = self.exec;
        let geometry = self.geometry;
        let (a, b, dst) = read_read_write(&mut self.slots, self.source, spare, self.dest);
        exec.subtract(&geometry, a, b, dst)?;
        self.swap_roles();
        Ok(())
    }

    /// Spare minus the current result: `spare & !source`.
    pub fn subtract_from_spare(&mut self) -> AccelResult<()> {
        let spare = self.require_spare()?;
        let exec = self.exec;
        let geometry = self.geometry;
        let (a, b, dst) = read_read_write(&mut self.slots, spare, self.source, self.dest);
        exec.subtract(&geometry, a, b, dst)?;
        self.swap_roles();
        Ok(())
    }

    /// `source &= !spare` without touching the destination.
    pub fn subtract_spare_in_place(&mut self) -> AccelResult<()> {
        let spare = self.require_spare()?;
        let exec = self.exec;
        let geometry = self.geometry;
        let (b, a) = read_write(&mut self.slots, spare, self.source);
        exec.subtract_in_place(&geometry, a, b)
    }

    /// Blocking read of the current result; the chain stays usable.
    pub fn read_source(&self) -> AccelResult<Pix> {
        self.read_slot(self.source)
    }

    /// Blocking read of the spare buffer.
    pub fn read_spare(&self) -> AccelResult<Pix> {
        self.read_slot(self.require_spare()?)
    }

    fn read_slot(&self, index: usize) -> AccelResult<Pix> {
        let mut words = self.exec.download(&self.geometry, &self.slots[index])?;
        words.truncate(self.geometry.words());
        let mut pix = Pix::from_words(self.geometry.width, self.geometry.height, 1, words)?;
        pix.set_colormap(self.colormap.clone());
        Ok(pix)
    }

    /// End the chain, reading the result back when asked to.
    pub fn finish(self, copy: HostCopy) -> AccelResult<Option<Pix>> {
        match copy {
            HostCopy::Yes => self.read_source().map(Some),
            HostCopy::No => {
                self.exec.synchronize()?;
                Ok(None)
            }
        }
    }

    /// End the chain and return the result.
    pub fn into_pix(self) -> AccelResult<Pix> {
        self.read_source()
    }
}

impl<E: KernelExecutor> Drop for BufferChain<'_, E> {
    fn drop(&mut self) {
        log::trace!("{}: releasing {} chain buffers", self.exec.name(), self.slots.len());
    }
}

/// Disjoint shared/exclusive borrows of two arena slots.
fn read_write<B>(slots: &mut [B], read: usize, write: usize) -> (&B, &mut B) {
    assert_ne!(read, write, "a stage cannot read and write the same buffer");
    if read < write {
        let (head, tail) = slots.split_at_mut(write);
        (&head[read], &mut tail[0])
    } else {
        let (head, tail) = slots.split_at_mut(read);
        (&tail[0], &mut head[write])
    }
}

/// Two shared borrows and one exclusive borrow of arena slots.
fn read_read_write<B>(slots: &mut [B], a: usize, b: usize, write: usize) -> (&B, &B, &mut B) {
    assert!(a != write && b != write, "a stage cannot read and write the same buffer");
    let (head, rest) = slots.split_at_mut(write);
    let (mid, tail) = rest.split_at_mut(1);
    let head: &[B] = head;
    let tail: &[B] = tail;
    let pick = move |i: usize| if i < write { &head[i] } else { &tail[i - write - 1] };
    (pick(a), pick(b), &mut mid[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_kernels::NativeExecutor;
    use crate::ops::variant::{BoundaryMode, MorphOp, MorphPlan};

    fn sample() -> Pix {
        let mut pix = Pix::new(70, 9, 1).unwrap();
        for x in 10..50 {
            pix.set_pixel(x, 4, 1);
        }
        pix.set_pixel(65, 0, 1);
        pix
    }

    #[test]
    fn test_read_write_split() {
        let mut slots = vec![1, 2, 3];
        let (r, w) = read_write(&mut slots, 2, 0);
        *w += *r;
        assert_eq!(slots, vec![4, 2, 3]);
        let (a, b, w) = read_read_write(&mut slots, 0, 2, 1);
        *w = *a * 10 + *b;
        assert_eq!(slots, vec![4, 43, 3]);
    }

    #[test]
    fn test_apply_swaps_roles_without_allocating() {
        let exec = NativeExecutor::new();
        let pix = sample();
        let mut chain = BufferChain::new(&exec, &pix).unwrap();
        assert_eq!(chain.roles(), (0, 1));
        let plan = MorphPlan::select(MorphOp::Dilate, 3, 3, BoundaryMode::Asymmetric);
        for pass in plan.passes() {
            chain.apply(pass).unwrap();
        }
        assert_eq!(chain.roles(), (0, 1));
        assert_eq!(chain.buffer_count(), 2);
        chain.apply(&plan.horizontal.unwrap()).unwrap();
        assert_eq!(chain.roles(), (1, 0));
        assert_eq!(chain.buffer_count(), 2);
    }

    #[test]
    fn test_spare_is_allocated_once() {
        let exec = NativeExecutor::new();
        let pix = sample();
        let mut chain = BufferChain::new(&exec, &pix).unwrap();
        assert!(chain.restore_from_spare().is_err());
        chain.save_to_spare().unwrap();
        chain.save_to_spare().unwrap();
        assert_eq!(chain.buffer_count(), 3);
        assert_eq!(chain.read_spare().unwrap(), pix);
    }

    #[test]
    fn test_subtract_spare_matches_words() {
        let exec = NativeExecutor::new();
        let a = sample();
        let mut b = Pix::new(70, 9, 1).unwrap();
        for x in 0..20 {
            b.set_pixel(x, 4, 1);
        }
        let mut chain = BufferChain::new(&exec, &a).unwrap();
        chain.load_spare(&b).unwrap();
        chain.subtract_spare().unwrap();
        let out = chain.into_pix().unwrap();
        for (i, word) in out.words().iter().enumerate() {
            assert_eq!(*word, a.words()[i] & !b.words()[i]);
        }
    }

    #[test]
    fn test_load_spare_rejects_other_geometry() {
        let exec = NativeExecutor::new();
        let mut chain = BufferChain::new(&exec, &sample()).unwrap();
        let other = Pix::new(71, 9, 1).unwrap();
        assert!(matches!(chain.load_spare(&other), Err(AccelError::GeometryMismatch(_))));
    }

    #[test]
    fn test_finish_without_host_copy() {
        let exec = NativeExecutor::new();
        let chain = BufferChain::new(&exec, &sample()).unwrap();
        assert!(chain.finish(HostCopy::No).unwrap().is_none());
    }

    #[test]
    fn test_rejects_non_binary_input() {
        let exec = NativeExecutor::new();
        let gray = Pix::new(8, 8, 8).unwrap();
        assert!(matches!(
            BufferChain::new(&exec, &gray),
            Err(AccelError::UnsupportedDepth { depth: 8, .. })
        ));
    }
}
