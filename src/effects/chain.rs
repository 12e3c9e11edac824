// SPDX-License-Identifier: GPL-3.0-only

//! Ordered effect chains and the ping-pong buffer hand-off

use super::Effect;
use crate::frame::Frame;
use std::mem;

/// Which of the pipeline's two buffers holds a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    /// The buffer the source wrote into
    Source,
    /// The scratch buffer
    Scratch,
}

impl BufferSlot {
    pub const fn other(self) -> Self {
        match self {
            BufferSlot::Source => BufferSlot::Scratch,
            BufferSlot::Scratch => BufferSlot::Source,
        }
    }

    /// Index into a `[source, scratch]` buffer pair
    pub const fn index(self) -> usize {
        match self {
            BufferSlot::Source => 0,
            BufferSlot::Scratch => 1,
        }
    }

    /// Slot holding the result after `len` effects
    pub const fn after(len: usize) -> Self {
        if len % 2 == 0 {
            BufferSlot::Source
        } else {
            BufferSlot::Scratch
        }
    }
}

/// Final buffer of a chain application
#[derive(Debug)]
pub struct ChainOutput<'a> {
    pub frame: &'a mut Frame,
    pub slot: BufferSlot,
}

/// Effects applied in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectChain {
    effects: Vec<Effect>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: impl Into<Effect>) {
        self.effects.push(effect.into());
    }

    /// Insert at `index`, clamped to the end of the chain
    pub fn insert(&mut self, index: usize, effect: impl Into<Effect>) {
        let index = index.min(self.effects.len());
        self.effects.insert(index, effect.into());
    }

    pub fn remove(&mut self, index: usize) -> Option<Effect> {
        (index < self.effects.len()).then(|| self.effects.remove(index))
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Effect> {
        self.effects.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Effect> {
        self.effects.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Effect> {
        self.effects.iter_mut()
    }

    /// Commit staged parameters of every effect; returns how many changed
    pub fn commit_pending(&mut self) -> usize {
        self.effects
            .iter_mut()
            .map(Effect::commit)
            .filter(|changed| *changed)
            .count()
    }

    /// Slot that `apply` will leave the result in
    pub fn result_slot(&self) -> BufferSlot {
        BufferSlot::after(self.effects.len())
    }

    /// Run every effect, alternating between `source` and `scratch`
    ///
    /// Effect `k` reads one buffer and writes the other; the roles swap
    /// before effect `k + 1`. An empty chain hands back `source` untouched.
    pub fn apply<'a>(&self, source: &'a mut Frame, scratch: &'a mut Frame) -> ChainOutput<'a> {
        let mut input = source;
        let mut output = scratch;
        let mut slot = BufferSlot::Source;

        for effect in &self.effects {
            effect.apply(input, output);
            mem::swap(&mut input, &mut output);
            slot = slot.other();
        }

        ChainOutput { frame: input, slot }
    }
}

impl FromIterator<Effect> for EffectChain {
    fn from_iter<I: IntoIterator<Item = Effect>>(iter: I) -> Self {
        Self {
            effects: iter.into_iter().collect(),
        }
    }
}

impl Extend<Effect> for EffectChain {
    fn extend<I: IntoIterator<Item = Effect>>(&mut self, iter: I) {
        self.effects.extend(iter);
    }
}
