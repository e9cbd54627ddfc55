//! Feature matcher.
//! Oriented FAST keypoints over a small scale pyramid, rotated 256-bit binary
//! descriptors, brute-force Hamming matching with cross-check.
//! A probe matches a template when the number of mutual best matches strictly
//! exceeds a threshold. A patch that yields no descriptors never matches, which
//! is how empty squares fall out of classification.

use image::{
    imageops::{self, FilterType},
    GrayImage,
};
use imageproc::corners::{corners_fast9, Corner};
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Radius of the disc used for orientation and descriptor sampling.
const PATCH_RADIUS: i32 = 15;
/// Sampling points are drawn inside this radius so rotated points stay in the patch.
const PATTERN_RADIUS: i32 = 13;
/// Keypoints closer than this to the image edge are discarded.
const BORDER: u32 = PATCH_RADIUS as u32 + 1;
const DESCRIPTOR_BITS: usize = 256;
const DESCRIPTOR_WORDS: usize = DESCRIPTOR_BITS / 64;
const PATTERN_SEED: u64 = 0x2545_f491_4f6c_dd1d;
const BLUR_SIGMA: f32 = 2.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherParams {
    /// Keypoint budget shared across all pyramid levels.
    pub max_features: usize,
    pub scale_factor: f32,
    pub levels: u8,
    pub fast_threshold: u8,
    /// Mutual matches farther apart than this are dropped. `None` keeps them all.
    pub max_distance: Option<u32>,
    /// Images whose shorter side is below this are upscaled before detection.
    pub min_side: u32,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            max_features: 500,
            scale_factor: 1.2,
            levels: 8,
            fast_threshold: 20,
            max_distance: Some(48),
            min_side: 48,
        }
    }
}

/// 256-bit binary descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor([u64; DESCRIPTOR_WORDS]);

impl Descriptor {
    pub fn from_words(words: [u64; DESCRIPTOR_WORDS]) -> Self {
        Self(words)
    }

    /// Hamming distance.
    pub fn distance(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Descriptors extracted from one image, computed once and reused across comparisons.
#[derive(Clone, Debug, Default)]
pub struct Features {
    descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// An accepted correspondence between a template descriptor and a probe descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

/// Verdict of one comparison. The count only feeds the threshold test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub accepted: usize,
}

type PointPair = [(i32, i32); 2];

/// Keypoint detector, descriptor extractor and matcher.
/// Holds only immutable parameters and the sampling pattern, so one instance
/// is shared by every comparison of a run.
#[derive(Clone, Debug)]
pub struct FeatureMatcher {
    params: MatcherParams,
    pattern: Vec<PointPair>,
}

impl Default for FeatureMatcher {
    fn default() -> Self {
        Self::new(MatcherParams::default())
    }
}

impl FeatureMatcher {
    pub fn new(params: MatcherParams) -> Self {
        Self {
            params,
            pattern: sampling_pattern(PATTERN_SEED),
        }
    }

    /// `true` iff more than `threshold` mutual matches are found.
    pub fn matches(&self, probe: &GrayImage, template: &GrayImage, threshold: u32) -> bool {
        self.compare(probe, template, threshold).matched
    }

    pub fn compare(&self, probe: &GrayImage, template: &GrayImage, threshold: u32) -> MatchResult {
        let probe = self.features(probe);
        let template = self.features(template);
        self.compare_features(&probe, &template, threshold)
    }

    pub fn compare_features(
        &self,
        probe: &Features,
        template: &Features,
        threshold: u32,
    ) -> MatchResult {
        let accepted = cross_check(
            template.descriptors(),
            probe.descriptors(),
            self.params.max_distance,
        )
        .len();
        trace!(
            probe = probe.len(),
            template = template.len(),
            accepted,
            threshold,
            "feature comparison"
        );
        MatchResult {
            matched: accepted > threshold as usize,
            accepted,
        }
    }

    /// Detects keypoints on every pyramid level and describes them.
    pub fn features(&self, image: &GrayImage) -> Features {
        let base = self.prepare(image);
        let pyramid = self.pyramid(&base);
        let budgets = self.level_budgets(pyramid.len());

        let mut descriptors = Vec::new();
        for (level, budget) in pyramid.iter().zip(budgets) {
            let keypoints = self.detect_keypoints(level, budget);
            if keypoints.is_empty() {
                continue;
            }
            let blurred = gaussian_blur_f32(level, BLUR_SIGMA);
            for kp in keypoints {
                let angle = intensity_centroid_angle(level, kp.x as i32, kp.y as i32);
                descriptors.push(self.describe(&blurred, kp.x as i32, kp.y as i32, angle));
            }
        }
        Features { descriptors }
    }

    /// Upscales tiny patches so the detector has room to work.
    fn prepare(&self, image: &GrayImage) -> GrayImage {
        let (w, h) = image.dimensions();
        let short = w.min(h);
        if short == 0 || short >= self.params.min_side {
            return image.clone();
        }
        let min_side = self.params.min_side as u64;
        let nw = (w as u64 * min_side).div_ceil(short as u64) as u32;
        let nh = (h as u64 * min_side).div_ceil(short as u64) as u32;
        imageops::resize(image, nw, nh, FilterType::Triangle)
    }

    fn effective_levels(&self) -> usize {
        if self.params.scale_factor > 1.0 {
            self.params.levels.max(1) as usize
        } else {
            1
        }
    }

    fn pyramid(&self, base: &GrayImage) -> Vec<GrayImage> {
        let min_dim = 2 * BORDER + 1;
        let mut levels = vec![base.clone()];
        let mut scale = 1.0f32;
        for _ in 1..self.effective_levels() {
            scale *= self.params.scale_factor;
            let w = (base.width() as f32 / scale).round() as u32;
            let h = (base.height() as f32 / scale).round() as u32;
            if w < min_dim || h < min_dim {
                break;
            }
            levels.push(imageops::resize(base, w, h, FilterType::Triangle));
        }
        levels
    }

    /// Splits the feature budget geometrically across levels, finer levels first.
    fn level_budgets(&self, built: usize) -> Vec<usize> {
        let levels = self.effective_levels();
        let total = self.params.max_features;
        let mut budgets = Vec::with_capacity(levels);
        if levels == 1 {
            budgets.push(total);
        } else {
            let factor = 1.0 / self.params.scale_factor as f64;
            let mut desired =
                total as f64 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));
            let mut assigned = 0usize;
            for _ in 0..levels - 1 {
                let n = (desired.round() as usize).min(total - assigned);
                budgets.push(n);
                assigned += n;
                desired *= factor;
            }
            budgets.push(total - assigned);
        }
        budgets.truncate(built);
        budgets
    }

    fn detect_keypoints(&self, image: &GrayImage, budget: usize) -> Vec<Corner> {
        let (w, h) = image.dimensions();
        if budget == 0 || w < 2 * BORDER + 1 || h < 2 * BORDER + 1 {
            return Vec::new();
        }

        let corners = corners_fast9(image, self.params.fast_threshold);
        let mut scores = vec![f32::NEG_INFINITY; (w * h) as usize];
        for c in &corners {
            scores[(c.y * w + c.x) as usize] = c.score;
        }

        let mut kept: Vec<Corner> = corners
            .into_iter()
            .filter(|c| {
                c.x >= BORDER && c.y >= BORDER && c.x < w - BORDER && c.y < h - BORDER
            })
            .filter(|c| is_local_max(&scores, w, c))
            .collect();

        kept.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        kept.truncate(budget);
        kept
    }

    fn describe(&self, blurred: &GrayImage, x: i32, y: i32, angle: f32) -> Descriptor {
        let (sin, cos) = angle.sin_cos();
        let rotate = |(px, py): (i32, i32)| {
            let rx = (cos * px as f32 - sin * py as f32).round() as i32;
            let ry = (sin * px as f32 + cos * py as f32).round() as i32;
            sample_clamped(blurred, x + rx, y + ry)
        };

        let mut words = [0u64; DESCRIPTOR_WORDS];
        for (bit, [p, q]) in self.pattern.iter().enumerate() {
            if rotate(*p) < rotate(*q) {
                words[bit / 64] |= 1 << (bit % 64);
            }
        }
        Descriptor(words)
    }
}

/// Mutual nearest neighbours by Hamming distance, sorted by ascending distance.
/// Ties between equally near candidates go to the lowest index.
pub fn cross_check(query: &[Descriptor], train: &[Descriptor], max_distance: Option<u32>) -> Vec<Match> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }

    let backward: Vec<usize> = train.iter().map(|d| nearest(d, query).0).collect();

    let mut matches: Vec<Match> = query
        .iter()
        .enumerate()
        .filter_map(|(qi, d)| {
            let (ti, distance) = nearest(d, train);
            (backward[ti] == qi).then_some(Match {
                query: qi,
                train: ti,
                distance,
            })
        })
        .filter(|m| max_distance.is_none_or(|max| m.distance <= max))
        .collect();

    matches.sort_by_key(|m| m.distance);
    matches
}

fn nearest(needle: &Descriptor, haystack: &[Descriptor]) -> (usize, u32) {
    let mut best = (0, u32::MAX);
    for (i, d) in haystack.iter().enumerate() {
        let dist = needle.distance(d);
        if dist < best.1 {
            best = (i, dist);
        }
    }
    best
}

/// 3x3 non-maximum suppression; equal scores keep the earliest in raster order.
fn is_local_max(scores: &[f32], w: u32, c: &Corner) -> bool {
    let own_idx = (c.y * w + c.x) as usize;
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = (c.x as i32 + dx) as u32;
            let ny = (c.y as i32 + dy) as u32;
            let idx = (ny * w + nx) as usize;
            let s = scores[idx];
            if s > c.score || (s == c.score && idx < own_idx) {
                return false;
            }
        }
    }
    true
}

/// Orientation from the intensity centroid of the disc around (x, y).
fn intensity_centroid_angle(image: &GrayImage, x: i32, y: i32) -> f32 {
    let mut m01 = 0f64;
    let mut m10 = 0f64;
    for dy in -PATCH_RADIUS..=PATCH_RADIUS {
        for dx in -PATCH_RADIUS..=PATCH_RADIUS {
            if dx * dx + dy * dy > PATCH_RADIUS * PATCH_RADIUS {
                continue;
            }
            let v = sample_clamped(image, x + dx, y + dy) as f64;
            m10 += dx as f64 * v;
            m01 += dy as f64 * v;
        }
    }
    m01.atan2(m10) as f32
}

#[inline]
fn sample_clamped(image: &GrayImage, x: i32, y: i32) -> u8 {
    let cx = x.clamp(0, image.width() as i32 - 1) as u32;
    let cy = y.clamp(0, image.height() as i32 - 1) as u32;
    image.get_pixel(cx, cy)[0]
}

/// Fixed pseudo-random point pairs inside the pattern disc.
fn sampling_pattern(seed: u64) -> Vec<PointPair> {
    let mut state = seed;
    let mut next_point = || loop {
        // xorshift64*
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        let r = state.wrapping_mul(0x2545_f491_4f6c_dd1d);
        let span = (2 * PATTERN_RADIUS + 1) as u64;
        let px = ((r >> 8) % span) as i32 - PATTERN_RADIUS;
        let py = ((r >> 32) % span) as i32 - PATTERN_RADIUS;
        if px * px + py * py <= PATTERN_RADIUS * PATTERN_RADIUS {
            return (px, py);
        }
    };

    let mut pattern = Vec::with_capacity(DESCRIPTOR_BITS);
    while pattern.len() < DESCRIPTOR_BITS {
        let p = next_point();
        let q = next_point();
        if p != q {
            pattern.push([p, q]);
        }
    }
    pattern
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Luma;

    /// Blocky pseudo-random texture; rich in FAST corners.
    pub(crate) fn texture(seed: u64, size: u32, block: u32) -> GrayImage {
        let mut state = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;
        let cells = size.div_ceil(block);
        let mut values = Vec::with_capacity((cells * cells) as usize);
        for _ in 0..cells * cells {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            values.push((state >> 24) as u8);
        }
        GrayImage::from_fn(size, size, |x, y| {
            Luma([values[((y / block) * cells + x / block) as usize]])
        })
    }

    fn uniform(size: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(size, size, Luma([value]))
    }

    #[test]
    fn test_texture_seeds_stay_distinct() {
        for (a, b) in [(2, 3), (22, 23), (500, 501), (900, 901), (301, 302), (11, 97)] {
            assert_ne!(texture(a, 96, 3), texture(b, 96, 3), "seeds {a} and {b}");
        }
    }

    #[test]
    fn test_hamming_distance() {
        let zero = Descriptor::from_words([0; 4]);
        let some = Descriptor::from_words([u64::MAX, 0, 0b1011, 0]);
        assert_eq!(zero.distance(&zero), 0);
        assert_eq!(zero.distance(&some), 67);
        assert_eq!(some.distance(&zero), 67);
    }

    #[test]
    fn test_pattern_is_fixed_and_inside_disc() {
        let a = sampling_pattern(PATTERN_SEED);
        let b = sampling_pattern(PATTERN_SEED);
        assert_eq!(a, b);
        assert_eq!(a.len(), DESCRIPTOR_BITS);
        for [p, q] in &a {
            assert_ne!(p, q);
            for (x, y) in [p, q] {
                assert!(x * x + y * y <= PATTERN_RADIUS * PATTERN_RADIUS);
            }
        }
    }

    #[test]
    fn test_level_budgets_sum_to_feature_budget() {
        let matcher = FeatureMatcher::default();
        let budgets = matcher.level_budgets(8);
        assert_eq!(budgets.len(), 8);
        assert_eq!(budgets.iter().sum::<usize>(), 500);
        assert!(budgets[0] > budgets[7]);
        // Fewer built levels just drop the coarse budgets.
        assert_eq!(matcher.level_budgets(3), budgets[..3].to_vec());
    }

    #[test]
    fn test_small_patches_are_upscaled() {
        let matcher = FeatureMatcher::default();
        let small = texture(7, 20, 3);
        let prepared = matcher.prepare(&small);
        assert_eq!(prepared.dimensions(), (48, 48));

        let large = texture(7, 96, 3);
        assert_eq!(matcher.prepare(&large).dimensions(), (96, 96));
    }

    #[test]
    fn test_cross_check_keeps_only_mutual_best() {
        let a = Descriptor::from_words([0, 0, 0, 0]);
        let a_close = Descriptor::from_words([1, 0, 0, 0]);
        let b = Descriptor::from_words([u64::MAX, u64::MAX, 0, 0]);

        // Both query entries prefer train[0]; only the exact one is mutual.
        let matches = cross_check(&[a_close, a], &[a, b], None);
        assert_eq!(
            matches,
            vec![Match {
                query: 1,
                train: 0,
                distance: 0
            }]
        );

        let swapped = cross_check(&[a, b], &[b, a], None);
        assert_eq!(swapped.len(), 2);
        assert!(swapped.iter().all(|m| m.distance == 0));
        assert_eq!((swapped[0].query, swapped[0].train), (0, 1));
    }

    #[test]
    fn test_default_distance_cap() {
        assert_eq!(MatcherParams::default().max_distance, Some(48));
    }

    #[test]
    fn test_cross_check_respects_max_distance() {
        let a = Descriptor::from_words([0, 0, 0, 0]);
        let far = Descriptor::from_words([u64::MAX, 0, 0, 0]);
        assert_eq!(cross_check(&[a], &[far], None).len(), 1);
        assert!(cross_check(&[a], &[far], Some(63)).is_empty());
        assert!(cross_check(&[], &[far], None).is_empty());
    }

    #[test]
    fn test_uniform_patch_never_matches() {
        let matcher = FeatureMatcher::default();
        let flat = uniform(96, 128);
        let tex = texture(1, 96, 3);

        assert!(matcher.features(&flat).is_empty());
        let result = matcher.compare(&flat, &tex, 0);
        assert_eq!(
            result,
            MatchResult {
                matched: false,
                accepted: 0
            }
        );
        assert!(!matcher.matches(&tex, &flat, 0));
    }

    #[test]
    fn test_identical_texture_matches() {
        let matcher = FeatureMatcher::default();
        let tex = texture(42, 96, 3);
        let result = matcher.compare(&tex, &tex, 20);
        assert!(result.matched, "only {} accepted matches", result.accepted);
    }

    #[test]
    fn test_threshold_must_be_strictly_exceeded() {
        let matcher = FeatureMatcher::default();
        let tex = texture(42, 96, 3);
        let accepted = matcher.compare(&tex, &tex, 0).accepted as u32;
        assert!(accepted > 0);
        assert!(!matcher.matches(&tex, &tex, accepted));
        assert!(matcher.matches(&tex, &tex, accepted - 1));
    }

    #[test]
    fn test_comparison_is_deterministic() {
        let matcher = FeatureMatcher::default();
        let probe = texture(3, 96, 3);
        let template = texture(4, 96, 4);
        let first = matcher.compare(&probe, &template, 20);
        for _ in 0..3 {
            assert_eq!(matcher.compare(&probe, &template, 20), first);
        }
        let again = FeatureMatcher::default().compare(&probe, &template, 20);
        assert_eq!(again, first);
    }

    #[test]
    fn test_unrelated_textures_do_not_match() {
        let matcher = FeatureMatcher::default();
        let black = texture(11, 96, 3);
        let white = texture(97, 96, 3);
        assert!(!matcher.matches(&black, &white, 20));
    }
}
