//! Permutations behind swap, move and sort operations.
//!
//! Every function returns an `order` where `order[i]` is the old index of the
//! element that ends up at position `i`. Index lists may arrive in any order
//! and with duplicates; they are normalized first. Callers check bounds.

use std::cmp::Ordering;

/// The permutation that leaves everything in place.
pub fn identity(len: usize) -> Vec<usize> {
    (0..len).collect()
}

/// True when `order` leaves every element in place.
pub fn is_identity(order: &[usize]) -> bool {
    order.iter().enumerate().all(|(i, &old)| i == old)
}

/// True when `order` holds every index of `0..len` exactly once.
pub fn is_permutation(order: &[usize], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &old in order {
        match seen.get_mut(old) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

/// Maps old index to new index. Entries of a malformed `order` that fall
/// outside its length are skipped.
pub fn inverse(order: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; order.len()];
    for (new, &old) in order.iter().enumerate() {
        if let Some(slot) = inverse.get_mut(old) {
            *slot = new;
        }
    }
    inverse
}

fn normalized(indices: &[usize]) -> Vec<usize> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

/// Order exchanging `a` and `b`.
pub fn swap(len: usize, a: usize, b: usize) -> Vec<usize> {
    let mut order = identity(len);
    order.swap(a, b);
    order
}

/// Moves each index one slot toward the front. An index already at the front,
/// or blocked by a moved neighbour that could not move, stays put.
pub fn move_up(len: usize, indices: &[usize]) -> Vec<usize> {
    let mut order = identity(len);
    let mut next_free = 0;
    for index in normalized(indices) {
        if index > next_free {
            order.swap(index - 1, index);
            next_free = index;
        } else {
            next_free = index + 1;
        }
    }
    order
}

/// Mirror image of [`move_up`].
pub fn move_down(len: usize, indices: &[usize]) -> Vec<usize> {
    let mut order = identity(len);
    let mut next_free = len;
    for index in normalized(indices).into_iter().rev() {
        if index + 1 < next_free {
            order.swap(index, index + 1);
            next_free = index + 1;
        } else {
            next_free = index;
        }
    }
    order
}

/// Moves the indices to the front, keeping their relative order.
pub fn move_top(len: usize, indices: &[usize]) -> Vec<usize> {
    move_to(len, indices, 0)
}

/// Moves the indices to the back, keeping their relative order.
pub fn move_bottom(len: usize, indices: &[usize]) -> Vec<usize> {
    move_to(len, indices, len)
}

/// Moves the indices so they form a block starting at `target`. The block is
/// clamped to fit, so `target` past the end means "to the bottom".
pub fn move_to(len: usize, indices: &[usize], target: usize) -> Vec<usize> {
    let moved = normalized(indices);
    let mut rest: Vec<usize> = Vec::with_capacity(len.saturating_sub(moved.len()));
    let mut cursor = moved.iter().peekable();
    for index in 0..len {
        if cursor.peek() == Some(&&index) {
            cursor.next();
        } else {
            rest.push(index);
        }
    }
    let at = target.min(rest.len());
    rest.splice(at..at, moved);
    rest
}

/// Stable sort of `len` elements under `compare`.
pub fn sorted(len: usize, descending: bool, compare: impl Fn(usize, usize) -> Ordering) -> Vec<usize> {
    let mut order = identity(len);
    if descending {
        order.sort_by(|&a, &b| compare(b, a));
    } else {
        order.sort_by(|&a, &b| compare(a, b));
    }
    order
}

/// Rearranges `items` so position `i` holds the item previously at `order[i]`.
/// `order` must satisfy [`is_permutation`].
pub fn apply_in_place<T>(items: &mut [T], order: &[usize]) {
    debug_assert_eq!(items.len(), order.len());
    let mut placed = vec![false; order.len()];
    for start in 0..order.len() {
        if placed[start] {
            continue;
        }
        let mut slot = start;
        loop {
            placed[slot] = true;
            let source = order[slot];
            if source == start {
                break;
            }
            items.swap(slot, source);
            slot = source;
        }
    }
}
