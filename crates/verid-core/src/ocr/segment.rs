//! Text-line segmentation over a binarized document image.
//!
//! Finds horizontal bands of ink via the row projection profile. This is
//! the same profile the preprocessor's deskew relies on, so bands are
//! close to level by the time they reach the recognizer.

use crate::preprocess::PreparedImage;

/// Half-open horizontal band `[top, bottom)` likely to hold one text line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineBand {
    pub top: u32,
    pub bottom: u32,
}

impl LineBand {
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Minimum rows for a band to count as a text line.
const MIN_BAND_HEIGHT: u32 = 3;
/// Bands separated by fewer blank rows than this are merged (broken
/// ascenders/descenders).
const MERGE_GAP: u32 = 2;

/// Segment a prepared document image into candidate text-line bands,
/// top to bottom.
pub fn segment_lines(image: &PreparedImage) -> Vec<LineBand> {
    let width = image.width();
    let height = image.height();
    // A row counts as inked once a few pixels are dark; scaled so wide
    // scans are not triggered by speckle.
    let min_ink = ((width / 200).max(2)) as u32;

    let mut inked = vec![false; height as usize];
    for y in 0..height {
        let mut count = 0u32;
        for x in 0..width {
            if image.pixel(x, y) < 128 {
                count += 1;
                if count >= min_ink {
                    inked[y as usize] = true;
                    break;
                }
            }
        }
    }

    let mut bands: Vec<LineBand> = Vec::new();
    let mut start: Option<u32> = None;
    for y in 0..height {
        match (inked[y as usize], start) {
            (true, None) => start = Some(y),
            (false, Some(top)) => {
                push_band(&mut bands, top, y);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(top) = start {
        push_band(&mut bands, top, height);
    }

    bands.retain(|b| b.height() >= MIN_BAND_HEIGHT);
    bands
}

fn push_band(bands: &mut Vec<LineBand>, top: u32, bottom: u32) {
    if let Some(last) = bands.last_mut() {
        if top.saturating_sub(last.bottom) < MERGE_GAP {
            last.bottom = bottom;
            return;
        }
    }
    bands.push(LineBand { top, bottom });
}

/// Horizontal ink extent `[left, right)` within a band, or `None` when
/// the band holds no ink at all.
pub fn ink_extent(image: &PreparedImage, band: LineBand) -> Option<(u32, u32)> {
    let mut left = u32::MAX;
    let mut right = 0u32;
    for y in band.top..band.bottom.min(image.height()) {
        for x in 0..image.width() {
            if image.pixel(x, y) < 128 {
                left = left.min(x);
                right = right.max(x + 1);
            }
        }
    }
    (left < right).then_some((left, right))
}
