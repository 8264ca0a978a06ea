//! Buffer scenarios spanning multiple operations, plus property tests for
//! the invariants every operation sequence must preserve.

use std::cmp::Ordering;

use buffer::{Buffer, Mark};
use proptest::prelude::*;

const SMALL: usize = 32;
const LARGE: usize = 128;

fn fill<const N: usize>(buf: &mut Buffer<N>, len: usize) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    buf.write_back(&data).unwrap();
}

fn scan<const N: usize>(buf: &Buffer<N>, mark: &Mark) -> Vec<u8> {
    let mut out = vec![0; buf.remaining_from(mark)];
    buf.get(mark, &mut out);
    out
}

fn drain<const N: usize>(buf: &mut Buffer<N>) -> Vec<u8> {
    let mut out = Vec::new();
    while !buf.is_empty() {
        let begin = buf.begin();
        let mut vecs = Vec::new();
        buf.iov(&begin, &mut vecs, 1024);
        let mut written = 0;
        for v in &vecs {
            out.extend_from_slice(v);
            written += v.len();
        }
        drop(vecs);
        buf.release_mark(begin);
        buf.drop_front(written);
    }
    out
}

fn basic_cycle<const N: usize>() {
    let mut buf: Buffer<N> = Buffer::new();
    assert!(buf.is_empty());

    // Append a value, read it back, drop it from the tail.
    let wrote = buf.write_back(&0x1234_5678u32.to_be_bytes()).unwrap();
    assert!(!buf.is_empty());
    assert_eq!(wrote, 4);
    let begin = buf.begin();
    let mut word = [0u8; 4];
    buf.get(&begin, &mut word);
    assert_eq!(u32::from_be_bytes(word), 0x1234_5678);
    buf.release_mark(begin);
    buf.drop_back(4);
    assert!(buf.is_empty());

    // Append a slice, read it back, drop it from the head.
    let samples: Vec<u8> = (b'a'..=b'z').collect();
    buf.write_back(&samples).unwrap();
    let begin = buf.begin();
    let mut out = vec![0u8; samples.len()];
    buf.get(&begin, &mut out);
    assert_eq!(out, samples);
    buf.release_mark(begin);
    buf.drop_front(samples.len());
    assert!(buf.is_empty());

    // Reserve, then write through the returned mark.
    let mark = buf.append_back(8).unwrap();
    buf.set(&mark, &3.25f64.to_be_bytes());
    let mut dword = [0u8; 8];
    buf.get(&mark, &mut dword);
    assert_eq!(f64::from_be_bytes(dword), 3.25);
    buf.release_mark(mark);
    buf.drop_front(8);
    assert!(buf.is_empty());
}

#[test]
fn should_run_basic_cycle_with_small_blocks() {
    basic_cycle::<SMALL>();
}

#[test]
fn should_run_basic_cycle_with_large_blocks() {
    basic_cycle::<LARGE>();
}

fn walk_with_marks<const N: usize>() {
    let mut buf: Buffer<N> = Buffer::new();
    let samples: Vec<u8> = (0..26).map(|i| b'a' + i).collect();
    buf.write_back(&samples).unwrap();
    buf.write_back(b"#").unwrap();

    // Walk a mark over every sample byte.
    let walker = buf.begin();
    let mut byte = [0u8; 1];
    for (i, expected) in samples.iter().enumerate() {
        buf.get(&walker, &mut byte);
        assert_eq!(byte[0], *expected, "byte {}", i);
        buf.advance(&walker, 1);
    }
    buf.get(&walker, &mut byte);
    assert_eq!(byte[0], b'#');

    // A second mark advanced in one go lands on the same byte.
    let jumper = buf.begin();
    buf.advance(&jumper, samples.len());
    assert_eq!(buf.mark_cmp(&jumper, &walker), Ordering::Equal);

    // After dropping the samples, the walker sits at the new head and the
    // end mark is one past it.
    buf.drop_front(samples.len());
    let end = buf.end();
    assert_eq!(buf.mark_cmp(&end, &walker), Ordering::Greater);
    buf.advance(&walker, 1);
    assert_eq!(buf.mark_cmp(&end, &walker), Ordering::Equal);

    buf.release_mark(walker);
    buf.release_mark(jumper);
    buf.release_mark(end);
    buf.drop_back(1);
    assert!(buf.is_empty());
}

#[test]
fn should_walk_marks_with_small_blocks() {
    walk_with_marks::<SMALL>();
}

#[test]
fn should_walk_marks_with_large_blocks() {
    walk_with_marks::<LARGE>();
}

#[test]
fn should_insert_at_block_seam_and_preserve_tail() {
    let mut buf: Buffer<SMALL> = Buffer::new();
    fill(&mut buf, SMALL);
    let seam = buf.end();
    fill(&mut buf, SMALL);
    let tail_before = scan(&buf, &seam);

    let gap = SMALL / 2;
    buf.insert(&seam, gap).unwrap();

    // Bytes at [seam, seam+gap) are fresh room; bytes at [seam+gap, end)
    // are the previous [seam, end-gap).
    let after = scan(&buf, &seam);
    assert_eq!(after.len(), tail_before.len() + gap);
    assert_eq!(&after[gap..], &tail_before[..]);
    buf.release_mark(seam);
}

#[test]
fn should_release_mid_buffer_for_all_marks() {
    let mut buf: Buffer<SMALL> = Buffer::new();
    fill(&mut buf, SMALL);
    let mid = buf.end();
    let mid_copy = buf.clone_mark(&mid);
    fill(&mut buf, SMALL);
    let end_before = buf.end();
    let expected: Vec<u8> = scan(&buf, &mid)[SMALL / 2..].to_vec();

    buf.release(&mid, SMALL / 2);

    assert_eq!(scan(&buf, &mid), expected);
    assert_eq!(scan(&buf, &mid_copy), expected);
    // The old end mark moved back onto the new end.
    let new_end = buf.end();
    assert_eq!(buf.mark_cmp(&end_before, &new_end), Ordering::Equal);
    buf.release_mark(new_end);
    buf.release_mark(mid);
    buf.release_mark(mid_copy);
    buf.release_mark(end_before);
}

#[test]
fn should_treat_every_tied_mark_alike_across_edits() {
    let mut buf: Buffer<SMALL> = Buffer::new();
    fill(&mut buf, SMALL);
    let seam = buf.end();
    let seam_b = buf.clone_mark(&seam);
    let seam_c = buf.clone_mark(&seam);
    fill(&mut buf, SMALL);
    let tail_before = scan(&buf, &seam);

    // Opening a gap at the shared position leaves the whole tie run in
    // place, addressing the gap start.
    let gap = 6;
    buf.insert(&seam, gap).unwrap();
    for mark in [&seam, &seam_b, &seam_c] {
        let after = scan(&buf, mark);
        assert_eq!(&after[gap..], &tail_before[..]);
    }

    // Closing it again through a mark from the middle of the run restores
    // every tied mark alike.
    buf.release(&seam_b, gap);
    for mark in [&seam, &seam_b, &seam_c] {
        assert_eq!(scan(&buf, mark), tail_before);
    }

    buf.release_mark(seam);
    buf.release_mark(seam_b);
    buf.release_mark(seam_c);
}

/// Request assembly the way the protocol layer uses the buffer: emit a
/// header with an unknown length, fill in the length afterwards through the
/// saved mark, then drain with the scatter/gather view.
#[test]
fn should_assemble_length_prefixed_request_and_drain() {
    let mut buf: Buffer<SMALL> = Buffer::new();
    buf.write_back(&[0xce]).unwrap(); // u32 marker
    let save = buf.append_back(4).unwrap(); // length, patched below

    let body: &[u8] = &[
        0x82, // two header fields
        0x00, 0x01, // request type
        0x01, 0x00, // sync
        0x82, // two body fields
        0x10, 0xcd, 0x02, 0x00, // space id 512
        0x20, 0x90, // empty key
    ];
    let total = buf.write_back(body).unwrap();
    buf.set(&save, &(total as u32).to_be_bytes());
    buf.release_mark(save);

    let drained = drain(&mut buf);
    assert_eq!(&drained[..5], &[0xce, 0x00, 0x00, 0x00, 0x0c]);
    assert_eq!(&drained[5..], body);
}

#[test]
fn should_commute_front_and_back_drops() {
    let mut a: Buffer<SMALL> = Buffer::new();
    let mut b: Buffer<SMALL> = Buffer::new();
    fill(&mut a, 3 * SMALL + 7);
    fill(&mut b, 3 * SMALL + 7);

    a.drop_front(SMALL + 3);
    a.drop_back(SMALL - 1);
    b.drop_back(SMALL - 1);
    b.drop_front(SMALL + 3);

    assert_eq!(drain(&mut a), drain(&mut b));
}

/// Random operation sequences against a flat byte-vector model: every
/// mutation must leave the buffer scanning identical to the model.
#[test]
fn should_match_byte_model_over_random_operations() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    for _ in 0..50 {
        let mut buf: Buffer<SMALL> = Buffer::new();
        let mut model: Vec<u8> = Vec::new();
        let mut counter = 0u8;
        let mut next = |counter: &mut u8| {
            *counter = counter.wrapping_add(1);
            *counter
        };

        for _ in 0..40 {
            match rng.gen_range(0..5) {
                0 => {
                    let n = rng.gen_range(1..=2 * SMALL);
                    let data: Vec<u8> = (0..n).map(|_| next(&mut counter)).collect();
                    buf.write_back(&data).unwrap();
                    model.extend_from_slice(&data);
                }
                1 if !model.is_empty() => {
                    let n = rng.gen_range(1..=model.len());
                    buf.drop_front(n);
                    model.drain(..n);
                }
                2 if !model.is_empty() => {
                    let n = rng.gen_range(1..=model.len());
                    buf.drop_back(n);
                    model.truncate(model.len() - n);
                }
                3 if !model.is_empty() => {
                    let at = rng.gen_range(0..model.len());
                    let n = rng.gen_range(1..SMALL);
                    let m = buf.begin();
                    buf.advance(&m, at);
                    buf.insert(&m, n).unwrap();
                    let fill: Vec<u8> = (0..n).map(|_| next(&mut counter)).collect();
                    buf.set(&m, &fill);
                    buf.release_mark(m);
                    model.splice(at..at, fill);
                }
                4 if !model.is_empty() => {
                    let at = rng.gen_range(0..model.len());
                    let n = rng.gen_range(1..=model.len() - at);
                    let m = buf.begin();
                    buf.advance(&m, at);
                    buf.release(&m, n);
                    buf.release_mark(m);
                    model.drain(at..at + n);
                }
                _ => {}
            }

            assert_eq!(buf.size(), model.len());
            if !model.is_empty() {
                let begin = buf.begin();
                assert_eq!(scan(&buf, &begin), model);
                buf.release_mark(begin);
            }
        }
    }
}

// ---------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------

proptest! {
    /// The scatter/gather view must reassemble to exactly the bytes a
    /// linear scan sees, for arbitrary fill/drop histories.
    #[test]
    fn should_reassemble_iov_to_linear_scan(
        len in 1usize..600,
        front in 0usize..100,
        back in 0usize..100,
    ) {
        prop_assume!(front + back < len);
        let mut buf: Buffer<SMALL> = Buffer::new();
        let data: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
        buf.write_back(&data).unwrap();
        buf.drop_front(front);
        buf.drop_back(back);

        let begin = buf.begin();
        let mut vecs = Vec::new();
        buf.iov(&begin, &mut vecs, 1024);
        let mut joined = Vec::new();
        for v in &vecs {
            joined.extend_from_slice(v);
        }
        prop_assert_eq!(&joined, &data[front..len - back]);
        drop(vecs);
        buf.release_mark(begin);
    }

    /// A mark keeps addressing the same logical byte across an insert that
    /// lands before, at, or after it.
    #[test]
    fn should_keep_marks_on_their_bytes_across_insert(
        len in 2usize..300,
        mark_at in 0usize..300,
        insert_at in 0usize..300,
        gap in 1usize..SMALL,
    ) {
        prop_assume!(mark_at < len && insert_at < len);
        let mut buf: Buffer<SMALL> = Buffer::new();
        let data: Vec<u8> = (0..len).map(|i| (i * 17 % 256) as u8).collect();
        buf.write_back(&data).unwrap();

        let m = buf.begin();
        buf.advance(&m, mark_at);
        let at = buf.begin();
        buf.advance(&at, insert_at);

        buf.insert(&at, gap).unwrap();

        let mut byte = [0u8; 1];
        if mark_at >= insert_at {
            // At-or-after the gap: for the marks at the gap position the
            // inserted room opens before them, still followed by their
            // original byte `gap` bytes later; strictly-later marks moved
            // with their byte.
            if mark_at == insert_at {
                buf.get_at(&m, gap, &mut byte);
            } else {
                buf.get(&m, &mut byte);
            }
        } else {
            buf.get(&m, &mut byte);
        }
        prop_assert_eq!(byte[0], data[mark_at]);
        buf.release_mark(m);
        buf.release_mark(at);
    }

    /// Insert followed by release of the same span restores both the bytes
    /// and every mark position.
    #[test]
    fn should_undo_insert_with_release(
        len in 2usize..300,
        at in 0usize..300,
        gap in 1usize..SMALL,
        probe in 0usize..300,
    ) {
        prop_assume!(at < len && probe < len);
        let mut buf: Buffer<SMALL> = Buffer::new();
        let data: Vec<u8> = (0..len).map(|i| (i * 13 % 256) as u8).collect();
        buf.write_back(&data).unwrap();
        let begin = buf.begin();
        let m = buf.begin();
        buf.advance(&m, at);
        let p = buf.begin();
        buf.advance(&p, probe);

        buf.insert(&m, gap).unwrap();
        buf.release(&m, gap);

        prop_assert_eq!(buf.size(), len);
        prop_assert_eq!(scan(&buf, &begin), data.clone());
        let mut byte = [0u8; 1];
        buf.get(&p, &mut byte);
        prop_assert_eq!(byte[0], data[probe]);
        buf.release_mark(begin);
        buf.release_mark(m);
        buf.release_mark(p);
    }
}
