//! Draw window arithmetic.
//!
//! Draw `n` covers heights `(start + w·(n-1), start + w·n]`; anything at or
//! below the starting block belongs to draw 1. Its seeding hash is taken
//! from `start + w·n + offset`.

use crate::config::LotteryConfig;
use crate::settlement::bonus::BonusFraction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawSchedule {
    pub starting_block: u64,
    pub blocks_per_draw: u64,
    pub hash_offset: u64,
}

impl DrawSchedule {
    pub fn new(starting_block: u64, blocks_per_draw: u64, hash_offset: u64) -> Self {
        Self {
            starting_block,
            blocks_per_draw: blocks_per_draw.max(1),
            hash_offset,
        }
    }

    pub fn from_config(config: &LotteryConfig) -> Self {
        Self::new(
            config.starting_block,
            config.blocks_per_draw,
            config.hash_confirmation_offset,
        )
    }

    /// `max(1, ceil((height - start) / w))`.
    pub fn draw_id(&self, height: u64) -> u64 {
        if height <= self.starting_block {
            return 1;
        }
        (height - self.starting_block).div_ceil(self.blocks_per_draw).max(1)
    }

    /// Last height inside draw `n`.
    pub fn draw_end(&self, draw_id: u64) -> u64 {
        self.starting_block + self.blocks_per_draw * draw_id
    }

    /// First height inside draw `n`.
    pub fn draw_start(&self, draw_id: u64) -> u64 {
        self.draw_end(draw_id.saturating_sub(1)) + 1
    }

    /// Height whose hash seeds draw `n`.
    pub fn hash_height(&self, draw_id: u64) -> u64 {
        self.draw_end(draw_id) + self.hash_offset
    }

    /// Draw receiving a lottery payment. Unconfirmed payments are
    /// provisionally placed in the draw of the next block to be scanned.
    pub fn lottery_draw(&self, block_height: Option<u64>, watermark: u64) -> u64 {
        self.draw_id(block_height.unwrap_or(watermark + 1))
    }

    /// Draw funded by a sponsor payment: always the one after it landed in.
    pub fn sponsor_draw(&self, block_height: Option<u64>, watermark: u64) -> u64 {
        self.draw_id(block_height.unwrap_or(watermark)) + 1
    }

    /// Draw currently accepting tickets given a scan watermark.
    pub fn current_draw(&self, watermark: u64) -> u64 {
        self.draw_id(watermark + 1)
    }

    /// Share of the bonus pool paid to a winner confirmed at `height`.
    ///
    /// `(offset + 1) / w`, where `offset` is the block's position inside the
    /// draw window, so later confirmations earn more.
    pub fn bonus_fraction(&self, draw_id: u64, height: Option<u64>) -> BonusFraction {
        let start = self.draw_start(draw_id);
        let offset = match height {
            Some(h) if h > start => (h - start).min(self.blocks_per_draw - 1),
            _ => 0,
        };
        BonusFraction::new(offset + 1, self.blocks_per_draw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> DrawSchedule {
        DrawSchedule::new(383_000, 1000, 6)
    }

    #[test]
    fn test_draw_id_boundaries() {
        let s = schedule();
        assert_eq!(s.draw_id(0), 1);
        assert_eq!(s.draw_id(383_000), 1);
        assert_eq!(s.draw_id(383_001), 1);
        assert_eq!(s.draw_id(384_000), 1);
        assert_eq!(s.draw_id(384_001), 2);
        assert_eq!(s.draw_id(385_000), 2);
    }

    #[test]
    fn test_window_heights() {
        let s = schedule();
        assert_eq!(s.draw_start(1), 383_001);
        assert_eq!(s.draw_end(1), 384_000);
        assert_eq!(s.draw_start(2), 384_001);
        assert_eq!(s.hash_height(1), 384_006);
        assert_eq!(s.hash_height(2), 385_006);
    }

    #[test]
    fn test_provisional_draws() {
        let s = schedule();
        // Watermark at the end of draw 1: mempool payments go to draw 2.
        assert_eq!(s.lottery_draw(None, 384_000), 2);
        assert_eq!(s.lottery_draw(Some(383_500), 384_000), 1);
        // Sponsors fund the following draw.
        assert_eq!(s.sponsor_draw(Some(383_500), 384_000), 2);
        assert_eq!(s.sponsor_draw(None, 384_000), 2);
        assert_eq!(s.current_draw(384_000), 2);
    }

    #[test]
    fn test_bonus_fraction_grows_with_lateness() {
        let s = schedule();
        assert_eq!(s.bonus_fraction(1, Some(383_001)), BonusFraction::new(1, 1000));
        assert_eq!(s.bonus_fraction(1, Some(383_400)), BonusFraction::new(400, 1000));
        assert_eq!(s.bonus_fraction(1, Some(384_000)), BonusFraction::new(1000, 1000));
        // Heights before the window (draw 1 backlog) count as the first block.
        assert_eq!(s.bonus_fraction(1, Some(100)), BonusFraction::new(1, 1000));
        assert_eq!(s.bonus_fraction(1, None), BonusFraction::new(1, 1000));
    }
}
