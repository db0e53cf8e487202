// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

use noisefs::core::block::{block_id, Block, BlockError};
use proptest::prelude::*;
use ring::rand::SystemRandom;

proptest! {
    #[test]
    fn prop_block_is_content_addressed(data in prop::collection::vec(any::<u8>(), 1..512)) {
        let a = Block::new(data.clone()).unwrap();
        let b = Block::new(data).unwrap();
        prop_assert_eq!(a.id(), b.id());
        prop_assert!(a.verify_integrity());
        let expected_id = block_id(a.data());
        prop_assert_eq!(a.id(), expected_id.as_str());
    }

    #[test]
    fn prop_xor3_is_involution(
        data in prop::collection::vec(any::<u8>(), 1..256),
        seed1 in prop::collection::vec(any::<u8>(), 1..256),
        seed2 in prop::collection::vec(any::<u8>(), 1..256),
    ) {
        let len = data.len();
        let mut r1 = seed1;
        let mut r2 = seed2;
        r1.resize(len, 0x5a);
        r2.resize(len, 0xa5);

        let a = Block::new(data).unwrap();
        let r1 = Block::new(r1).unwrap();
        let r2 = Block::new(r2).unwrap();

        let anon = a.xor3(&r1, &r2).unwrap();
        let back = anon.xor3(&r1, &r2).unwrap();
        prop_assert_eq!(back.data(), a.data());
        prop_assert_eq!(back.id(), a.id());
    }

    #[test]
    fn prop_xor3_is_commutative_in_randomizers(
        data in prop::collection::vec(any::<u8>(), 1..256),
        seed in prop::collection::vec(any::<u8>(), 1..256),
    ) {
        let len = data.len();
        let mut r = seed;
        r.resize(len, 1);
        let mut r_rev = r.clone();
        r_rev.reverse();

        let a = Block::new(data).unwrap();
        let r1 = Block::new(r).unwrap();
        let r2 = Block::new(r_rev).unwrap();

        let one = a.xor3(&r1, &r2).unwrap();
        let two = a.xor3(&r2, &r1).unwrap();
        prop_assert_eq!(one.data(), two.data());
    }

    #[test]
    fn prop_padding_preserves_prefix(data in prop::collection::vec(any::<u8>(), 1..64)) {
        let b = Block::new_padded(data.clone(), 64).unwrap();
        prop_assert_eq!(b.len(), 64);
        prop_assert_eq!(&b.data()[..data.len()], data.as_slice());
        prop_assert!(b.data()[data.len()..].iter().all(|&x| x == 0));
    }
}

#[test]
fn empty_block_rejected() {
    assert!(matches!(Block::new(Vec::new()), Err(BlockError::Empty)));
    assert!(matches!(
        Block::new_padded(Vec::new(), 16),
        Err(BlockError::Empty)
    ));
}

#[test]
fn zero_size_random_rejected() {
    let rng = SystemRandom::new();
    assert!(matches!(
        Block::new_random(0, &rng),
        Err(BlockError::ZeroSize)
    ));
}

#[test]
fn random_blocks_differ() {
    let rng = SystemRandom::new();
    let a = Block::new_random(64, &rng).unwrap();
    let b = Block::new_random(64, &rng).unwrap();
    assert_ne!(a.id(), b.id());
}

#[test]
fn xor_length_mismatch_rejected() {
    let a = Block::new(vec![1, 2, 3]).unwrap();
    let b = Block::new(vec![1, 2]).unwrap();
    assert!(matches!(a.xor(&b), Err(BlockError::LengthMismatch)));
    let c = Block::new(vec![9, 9, 9]).unwrap();
    assert!(matches!(a.xor3(&c, &b), Err(BlockError::LengthMismatch)));
}

#[test]
fn xor_result_id_derives_from_output_bytes() {
    let a = Block::new(vec![0xff; 8]).unwrap();
    let b = Block::new(vec![0x0f; 8]).unwrap();
    let x = a.xor(&b).unwrap();
    assert_eq!(x.id(), block_id(&vec![0xf0; 8]).as_str());
    assert!(x.verify_integrity());
}
