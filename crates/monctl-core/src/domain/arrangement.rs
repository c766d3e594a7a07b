//! Arrangement solver: relative placements in, absolute positions out.
//!
//! An [`ArrangementSpec`] describes where each monitor sits relative to
//! another one ("S is to the left of P, top edges aligned").  The placements
//! form a tree rooted at the single monitor marked
//! [`RelativePosition::Primary`].  [`solve`] validates that tree, walks it
//! breadth-first from the root (which is placed at `(0, 0)`), and then applies
//! the platform's [`PlatformRules`]:
//!
//! - negative coordinates forbidden: the whole layout is translated so its
//!   bounding box starts at `(0, 0)`;
//! - primary at origin mandated: the translation moves every monitor except
//!   the primary, and no other monitor may end up at `(0, 0)`;
//! - overlap forbidden: overlapping pairs are reported, never resolved.
//!
//! Coordinates are `i32`.  A placement whose monitor would reach past that
//! range, before or after normalization, is reported as
//! [`ArrangementIssue::OutOfRange`] instead of wrapping.
//!
//! The solver is a pure function.  Applying the result is the caller's job.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::geometry::{Point, Rect, Size};
use super::monitor::PlatformRules;

/// Symbolic position of a monitor relative to its reference monitor.
///
/// `<SIDE>_TOP` / `<SIDE>_LEFT` align the leading edges, `_BOTTOM` / `_RIGHT`
/// align the trailing edges, `_CENTERED` centres the monitor along the shared
/// edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelativePosition {
    Primary,
    LeftTop,
    LeftBottom,
    LeftCentered,
    AboveLeft,
    AboveRight,
    AboveCentered,
    RightTop,
    RightBottom,
    RightCentered,
    BelowLeft,
    BelowRight,
    BelowCentered,
}

impl RelativePosition {
    /// Position of a monitor of size `child` placed at `self` relative to a
    /// monitor at `parent_pos` with size `parent`.
    ///
    /// Returns `None` if the result does not fit in desktop coordinates.
    pub fn resolve(self, parent_pos: Point, parent: Size, child: Size) -> Option<Point> {
        let (px, py) = (i64::from(parent_pos.x), i64::from(parent_pos.y));
        let (pw, ph) = (i64::from(parent.width), i64::from(parent.height));
        let (cw, ch) = (i64::from(child.width), i64::from(child.height));
        let (x, y) = match self {
            Self::Primary => (0, 0),
            Self::LeftTop => (px - cw, py),
            Self::LeftBottom => (px - cw, py + ph - ch),
            Self::LeftCentered => (px - cw, py + (ph - ch) / 2),
            Self::AboveLeft => (px, py - ch),
            Self::AboveRight => (px + pw - cw, py - ch),
            Self::AboveCentered => (px + (pw - cw) / 2, py - ch),
            Self::RightTop => (px + pw, py),
            Self::RightBottom => (px + pw, py + ph - ch),
            Self::RightCentered => (px + pw, py + (ph - ch) / 2),
            Self::BelowLeft => (px, py + ph),
            Self::BelowRight => (px + pw - cw, py + ph),
            Self::BelowCentered => (px + (pw - cw) / 2, py + ph),
        };
        Some(Point::new(i32::try_from(x).ok()?, i32::try_from(y).ok()?))
    }
}

/// Where a monitor goes: a symbolic position or an explicit `(dx, dy)` offset
/// from its reference monitor's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Placement {
    Relative(RelativePosition),
    Offset(Point),
}

impl Placement {
    pub fn is_primary(&self) -> bool {
        matches!(self, Placement::Relative(RelativePosition::Primary))
    }
}

impl From<RelativePosition> for Placement {
    fn from(pos: RelativePosition) -> Self {
        Placement::Relative(pos)
    }
}

impl From<Point> for Placement {
    fn from(offset: Point) -> Self {
        Placement::Offset(offset)
    }
}

/// Placement of one monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrangementEntry {
    pub placement: Placement,
    /// Reference monitor.  `None` only for the primary, or for an explicit
    /// offset, which is then taken from the primary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_to: Option<String>,
}

/// Desired arrangement: monitor name → placement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArrangementSpec {
    entries: BTreeMap<String, ArrangementEntry>,
}

impl ArrangementSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the placement for `name`, builder style.
    pub fn with(
        mut self,
        name: impl Into<String>,
        placement: impl Into<Placement>,
        relative_to: Option<&str>,
    ) -> Self {
        self.insert(name, placement, relative_to);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        placement: impl Into<Placement>,
        relative_to: Option<&str>,
    ) {
        self.entries.insert(
            name.into(),
            ArrangementEntry {
                placement: placement.into(),
                relative_to: relative_to.map(str::to_string),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ArrangementEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &ArrangementEntry)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name of the entry marked PRIMARY, if exactly one is.
    pub fn primary(&self) -> Option<&str> {
        let mut roots = self.entries.iter().filter(|(_, e)| e.placement.is_primary());
        match (roots.next(), roots.next()) {
            (Some((name, _)), None) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Builds the explicit-offset spec equivalent to a solved layout: `primary`
    /// becomes the root and every other monitor an offset from it.
    ///
    /// Returns `None` if `primary` is not part of `positions`, or an offset
    /// does not fit in `i32`.
    pub fn from_positions(positions: &BTreeMap<String, Point>, primary: &str) -> Option<Self> {
        let root = *positions.get(primary)?;
        let mut spec = ArrangementSpec::new();
        for (name, pos) in positions {
            if name == primary {
                spec.insert(name.clone(), RelativePosition::Primary, None);
            } else {
                let offset = Point::new(pos.x.checked_sub(root.x)?, pos.y.checked_sub(root.y)?);
                spec.insert(name.clone(), offset, Some(primary));
            }
        }
        Some(spec)
    }
}

/// One problem found while validating an [`ArrangementSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrangementIssue {
    #[error("no monitor is marked PRIMARY")]
    NoPrimary,

    #[error("more than one monitor is marked PRIMARY: {}", .0.join(", "))]
    MultiplePrimaries(Vec<String>),

    #[error("primary monitor {0} must not be relative to another monitor")]
    PrimaryWithReference(String),

    #[error("{0} has a symbolic position but no reference monitor")]
    MissingReference(String),

    #[error("{name} is placed relative to {target}, which is not part of the arrangement")]
    DanglingReference { name: String, target: String },

    #[error("placement cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("no path to the primary monitor from: {}", .0.join(", "))]
    Unreachable(Vec<String>),

    #[error("size of {0} is unknown")]
    UnknownSize(String),

    #[error("{0} would sit at the origin, which is reserved for the primary monitor")]
    OriginConflict(String),

    #[error("{0} would be placed outside the desktop coordinate range")]
    OutOfRange(String),
}

/// Errors returned by [`solve`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrangementError {
    /// The arrangement is malformed; every problem found is listed.
    #[error("invalid arrangement: {}", join_issues(.0))]
    InvalidArrangement(Vec<ArrangementIssue>),

    /// The platform forbids overlap and these pairs overlap.
    #[error("monitors overlap: {}", join_pairs(.0))]
    OverlapDetected(Vec<(String, String)>),
}

fn join_issues(issues: &[ArrangementIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(a, b)| format!("{a}/{b}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Solves `spec` into absolute positions.
///
/// `sizes` must contain the current size of every monitor named in `spec`.
///
/// # Errors
///
/// - [`ArrangementError::InvalidArrangement`] if the placement graph is not a
///   tree rooted at exactly one PRIMARY node, a reference is unknown, a size
///   is missing, a monitor would land outside the `i32` coordinate range, or
///   (primary at origin) another monitor lands on `(0, 0)`.
/// - [`ArrangementError::OverlapDetected`] if `rules` forbid overlap and the
///   solved layout has overlapping monitors.
pub fn solve(
    spec: &ArrangementSpec,
    sizes: &BTreeMap<String, Size>,
    rules: &PlatformRules,
) -> Result<BTreeMap<String, Point>, ArrangementError> {
    let root = validate(spec, sizes)?;

    let mut positions = place_breadth_first(spec, sizes, &root)?;
    normalize(&mut positions, sizes, &root, rules)?;

    if rules.primary_at_origin {
        let conflicts: Vec<ArrangementIssue> = positions
            .iter()
            .filter(|(name, pos)| **name != root && **pos == Point::ORIGIN)
            .map(|(name, _)| ArrangementIssue::OriginConflict(name.clone()))
            .collect();
        if !conflicts.is_empty() {
            return Err(ArrangementError::InvalidArrangement(conflicts));
        }
    }

    if !rules.overlap_allowed {
        let pairs = overlapping_pairs(&positions, sizes);
        if !pairs.is_empty() {
            return Err(ArrangementError::OverlapDetected(pairs));
        }
    }

    Ok(positions)
}

/// Returns every pair of monitors whose rectangles overlap, names ordered.
pub fn overlapping_pairs(
    positions: &BTreeMap<String, Point>,
    sizes: &BTreeMap<String, Size>,
) -> Vec<(String, String)> {
    let rects: Vec<(&String, Rect)> = positions
        .iter()
        .filter_map(|(name, pos)| sizes.get(name).map(|s| (name, Rect::from_origin_size(*pos, *s))))
        .collect();

    let mut pairs = Vec::new();
    for (i, (a, ra)) in rects.iter().enumerate() {
        for (b, rb) in &rects[i + 1..] {
            if ra.overlaps(rb) {
                pairs.push(((*a).clone(), (*b).clone()));
            }
        }
    }
    pairs
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Checks the tree shape and returns the root's name.
fn validate(spec: &ArrangementSpec, sizes: &BTreeMap<String, Size>) -> Result<String, ArrangementError> {
    let mut issues = Vec::new();

    let roots: Vec<&String> = spec
        .entries
        .iter()
        .filter(|(_, e)| e.placement.is_primary())
        .map(|(name, _)| name)
        .collect();

    match roots.len() {
        0 => issues.push(ArrangementIssue::NoPrimary),
        1 => {}
        _ => issues.push(ArrangementIssue::MultiplePrimaries(
            roots.iter().map(|s| s.to_string()).collect(),
        )),
    }

    for (name, entry) in &spec.entries {
        if entry.placement.is_primary() {
            if entry.relative_to.is_some() {
                issues.push(ArrangementIssue::PrimaryWithReference(name.clone()));
            }
        } else {
            match (&entry.placement, &entry.relative_to) {
                (Placement::Relative(_), None) => {
                    issues.push(ArrangementIssue::MissingReference(name.clone()));
                }
                (_, Some(target)) if !spec.entries.contains_key(target) => {
                    issues.push(ArrangementIssue::DanglingReference {
                        name: name.clone(),
                        target: target.clone(),
                    });
                }
                _ => {}
            }
        }
        if !sizes.contains_key(name) {
            issues.push(ArrangementIssue::UnknownSize(name.clone()));
        }
    }

    if let [root] = roots.as_slice() {
        issues.extend(reachability_issues(spec, root));
    }

    match (issues.is_empty(), roots.first()) {
        (true, Some(root)) => Ok((*root).clone()),
        _ => Err(ArrangementError::InvalidArrangement(issues)),
    }
}

/// Reference monitor of `name`; offsets without a reference hang off the root.
fn parent_of<'a>(spec: &'a ArrangementSpec, name: &str, root: &'a str) -> Option<&'a str> {
    let entry = spec.entries.get(name)?;
    if entry.placement.is_primary() {
        return None;
    }
    match (&entry.relative_to, &entry.placement) {
        (Some(target), _) => Some(target.as_str()),
        (None, Placement::Offset(_)) => Some(root),
        (None, Placement::Relative(_)) => None,
    }
}

/// Finds cycles and nodes whose reference chain never reaches `root`.
fn reachability_issues(spec: &ArrangementSpec, root: &str) -> Vec<ArrangementIssue> {
    let mut reaches: HashMap<&str, bool> = HashMap::new();
    let mut cycles: BTreeSet<Vec<String>> = BTreeSet::new();
    let mut in_cycle: BTreeSet<String> = BTreeSet::new();

    for start in spec.names() {
        let mut path: Vec<&str> = Vec::new();
        let mut current = start;
        let ok = loop {
            if current == root {
                break true;
            }
            if let Some(known) = reaches.get(current) {
                break *known;
            }
            if let Some(pos) = path.iter().position(|n| *n == current) {
                let mut members: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                // Canonical rotation so the same cycle found from two starts dedupes.
                if let Some(min_idx) = members
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.cmp(b.1))
                    .map(|(i, _)| i)
                {
                    members.rotate_left(min_idx);
                }
                in_cycle.extend(members.iter().cloned());
                cycles.insert(members);
                break false;
            }
            path.push(current);
            match parent_of(spec, current, root) {
                Some(parent) if spec.entries.contains_key(parent) => current = parent,
                _ => break false,
            }
        };
        for node in path {
            reaches.insert(node, ok);
        }
    }

    let mut issues: Vec<ArrangementIssue> = cycles.into_iter().map(ArrangementIssue::Cycle).collect();
    let unreachable: Vec<String> = spec
        .names()
        .filter(|n| *n != root && !reaches.get(n).copied().unwrap_or(false) && !in_cycle.contains(*n))
        .map(str::to_string)
        .collect();
    if !unreachable.is_empty() {
        issues.push(ArrangementIssue::Unreachable(unreachable));
    }
    issues
}

// ── Placement ─────────────────────────────────────────────────────────────────

/// `pos` if a monitor of `size` there keeps every edge inside `i32`.
fn in_range(pos: Point, size: Size) -> Option<Point> {
    Rect::checked_from_origin_size(pos, size).map(|_| pos)
}

fn out_of_range(names: Vec<String>) -> ArrangementError {
    ArrangementError::InvalidArrangement(names.into_iter().map(ArrangementIssue::OutOfRange).collect())
}

fn place_breadth_first(
    spec: &ArrangementSpec,
    sizes: &BTreeMap<String, Size>,
    root: &str,
) -> Result<BTreeMap<String, Point>, ArrangementError> {
    let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for name in spec.names() {
        if let Some(parent) = parent_of(spec, name, root) {
            children.entry(parent).or_default().push(name);
        }
    }

    let mut positions = BTreeMap::new();
    let mut outside = Vec::new();
    let root_size = sizes.get(root).copied().unwrap_or_default();
    if in_range(Point::ORIGIN, root_size).is_none() {
        return Err(out_of_range(vec![root.to_string()]));
    }
    positions.insert(root.to_string(), Point::ORIGIN);

    let mut queue = VecDeque::from([root]);
    while let Some(parent) = queue.pop_front() {
        let parent_pos = positions.get(parent).copied().unwrap_or_default();
        let parent_size = sizes.get(parent).copied().unwrap_or_default();
        for child in children.get(parent).map(Vec::as_slice).unwrap_or_default() {
            let child_size = sizes.get(*child).copied().unwrap_or_default();
            let pos = match spec.entries.get(*child).map(|e| e.placement) {
                Some(Placement::Relative(rel)) => rel.resolve(parent_pos, parent_size, child_size),
                Some(Placement::Offset(off)) => parent_pos.checked_offset(off.x, off.y),
                None => continue,
            };
            // Descendants of an out-of-range monitor are not placed.
            match pos.and_then(|p| in_range(p, child_size)) {
                Some(pos) => {
                    positions.insert(child.to_string(), pos);
                    queue.push_back(*child);
                }
                None => outside.push(child.to_string()),
            }
        }
    }

    if outside.is_empty() {
        Ok(positions)
    } else {
        outside.sort();
        Err(out_of_range(outside))
    }
}

fn normalize(
    positions: &mut BTreeMap<String, Point>,
    sizes: &BTreeMap<String, Size>,
    root: &str,
    rules: &PlatformRules,
) -> Result<(), ArrangementError> {
    if rules.negative_coordinates {
        return Ok(());
    }
    let min_x = positions.values().map(|p| p.x).min().unwrap_or(0).min(0);
    let min_y = positions.values().map(|p| p.y).min().unwrap_or(0).min(0);
    if min_x == 0 && min_y == 0 {
        return Ok(());
    }
    let (Some(dx), Some(dy)) = (min_x.checked_neg(), min_y.checked_neg()) else {
        return Err(out_of_range(positions.keys().cloned().collect()));
    };
    debug!(dx, dy, primary_at_origin = rules.primary_at_origin, "translating layout to non-negative coordinates");

    let mut outside = Vec::new();
    for (name, pos) in positions.iter_mut() {
        if rules.primary_at_origin && name == root {
            continue;
        }
        let size = sizes.get(name).copied().unwrap_or_default();
        match pos.checked_offset(dx, dy).and_then(|p| in_range(p, size)) {
            Some(moved) => *pos = moved,
            None => outside.push(name.clone()),
        }
    }
    if outside.is_empty() {
        Ok(())
    } else {
        Err(out_of_range(outside))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
