//! Rectangle allocation for view snapshots.
//!
//! A binary-split variant of the squarified treemap: children (already in
//! non-increasing size order) are split into two greedily balanced bins, the
//! rectangle is divided along its longer axis in proportion to the bin sums,
//! and each half recurses. The result keeps aspect ratios close to square,
//! respects size order and is deterministic for a given input.

use super::{Rect, ViewEntry, ViewKind};

/// Lays out `entry` and its whole snapshot subtree inside `rect`,
/// reserving `title_height` pixels of title strip in every directory.
pub(super) fn allocate_view(
    entry: &mut ViewEntry,
    rect: Rect,
    title_height: i32,
    min_pixel_area: i64,
) {
    entry.draw_area = rect;
    if entry.children.is_empty() {
        return;
    }
    if rect.h < title_height || rect.w < 1 {
        zero_areas(&mut entry.children);
        return;
    }

    let inner = Rect {
        x: rect.x + 2,
        y: rect.y + title_height + 2,
        w: rect.w - 4,
        h: rect.h - title_height - 4,
    };
    allocate_children(&mut entry.children, inner, min_pixel_area);

    for child in &mut entry.children {
        if child.kind == ViewKind::Directory {
            let area = child.draw_area;
            allocate_view(child, area, title_height, min_pixel_area);
        }
    }
}

fn zero_areas(children: &mut [ViewEntry]) {
    for child in children {
        child.draw_area = Rect::default();
        zero_areas(&mut child.children);
    }
}

fn allocate_children(children: &mut [ViewEntry], rect: Rect, min_pixel_area: i64) {
    if children.is_empty() {
        return;
    }
    if rect.w < 1 || rect.h < 1 {
        zero_areas(children);
        return;
    }
    if children.len() == 1 {
        set_child_rect(&mut children[0], rect);
        return;
    }

    let total: i64 = children.iter().map(|c| c.size.max(0)).sum();

    // cells that would land below the minimum pixel area are dropped,
    // smallest first, but the two largest always stay
    let available_area = rect.w as i64 * rect.h as i64;
    let min_size = if total > 0 {
        (total as i128 * min_pixel_area as i128 / available_area as i128) as i64
    } else {
        0
    };
    let mut kept = children.len();
    for (i, child) in children.iter().enumerate() {
        if child.size < min_size && i > 1 {
            kept = i;
            break;
        }
    }
    let (kept_children, dropped) = children.split_at_mut(kept);
    zero_areas(dropped);
    split_bins(kept_children, rect);
}

/// Greedy two-bin balance over a size-sorted prefix: children move from the
/// tail bin into the head bin while that narrows the difference of sums.
fn split_bins(children: &mut [ViewEntry], rect: Rect) {
    if children.len() == 1 {
        set_child_rect(&mut children[0], rect);
        return;
    }

    let mut sum1 = children[0].size.max(0);
    let mut sum2: i64 = children[1..].iter().map(|c| c.size.max(0)).sum();
    let mut bin1_last = 0usize;
    for child in &children[1..] {
        let size = child.size.max(0);
        if (sum2 - sum1 - size * 2).abs() < (sum2 - sum1).abs() {
            bin1_last += 1;
            sum1 += size;
            sum2 -= size;
        } else {
            break;
        }
    }
    if sum1 == 0 && sum2 == 0 {
        sum1 = 1;
        sum2 = 1;
    }

    let (bin1, bin2) = children.split_at_mut(bin1_last + 1);
    let div_x = rect.w >= rect.h;
    if div_x {
        let mid = (rect.w as i64 * sum1 / (sum1 + sum2)) as i32;
        let left = Rect { w: mid, ..rect };
        let right = Rect {
            x: rect.x + mid,
            w: rect.w - mid,
            ..rect
        };
        allocate_children_bin(bin1, left);
        allocate_children_bin(bin2, right);
    } else {
        let mid = (rect.h as i64 * sum1 / (sum1 + sum2)) as i32;
        let top = Rect { h: mid, ..rect };
        let bottom = Rect {
            y: rect.y + mid,
            h: rect.h - mid,
            ..rect
        };
        allocate_children_bin(bin1, top);
        allocate_children_bin(bin2, bottom);
    }
}

fn allocate_children_bin(bin: &mut [ViewEntry], rect: Rect) {
    match bin.len() {
        0 => {}
        1 => set_child_rect(&mut bin[0], rect),
        _ => {
            if rect.w < 1 || rect.h < 1 {
                zero_areas(bin);
            } else {
                split_bins(bin, rect);
            }
        }
    }
}

/// Cells smaller than 1x1 collapse to 0x0 and are not rendered.
fn set_child_rect(child: &mut ViewEntry, rect: Rect) {
    child.draw_area = rect;
    if rect.w < 1 || rect.h < 1 {
        child.draw_area = Rect::default();
    }
}
