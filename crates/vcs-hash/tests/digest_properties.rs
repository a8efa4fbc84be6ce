use proptest::prelude::*;
use vcs_hash::zlib::{self, Compression};
use vcs_hash::{HashAlgorithm, Hasher, ObjectId};

proptest! {
    #[test]
    fn digest_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        for algo in [HashAlgorithm::Sha1, HashAlgorithm::Sha256] {
            let a = Hasher::hash_object(algo, "blob", &data).unwrap();
            let b = Hasher::hash_object(algo, "blob", &data).unwrap();
            prop_assert_eq!(a, b);
            prop_assert_eq!(a.as_bytes().len(), algo.digest_len());
        }
    }

    #[test]
    fn object_kind_is_part_of_identity(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let blob = Hasher::hash_object(HashAlgorithm::Sha1, "blob", &data).unwrap();
        let tree = Hasher::hash_object(HashAlgorithm::Sha1, "tree", &data).unwrap();
        prop_assert_ne!(blob, tree);
    }

    #[test]
    fn hex_form_parses_back(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        let oid = Hasher::digest(HashAlgorithm::Sha256, &data).unwrap();
        let hex = oid.to_hex();
        prop_assert!(hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        prop_assert_eq!(hex.parse::<ObjectId>().unwrap(), oid);
    }

    #[test]
    fn compression_is_lossless(
        data in proptest::collection::vec(any::<u8>(), 0..8192),
        lvl in 0u32..=9,
    ) {
        let packed = zlib::compress(&data, Compression::new(lvl)).unwrap();
        prop_assert_eq!(zlib::decompress(&packed).unwrap(), data.clone());
        prop_assert_eq!(zlib::decompress_with_limit(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn repetitive_data_is_lossless(
        unit in proptest::collection::vec(any::<u8>(), 1..16),
        times in 1usize..4096,
        lvl in 0u32..=9,
    ) {
        let data = unit.repeat(times);
        let packed = zlib::compress(&data, Compression::new(lvl)).unwrap();
        prop_assert_eq!(zlib::decompress(&packed).unwrap(), data);
    }

    #[test]
    fn flipped_bytes_never_decode_silently(
        data in proptest::collection::vec(any::<u8>(), 16..512),
        pos in any::<prop::sample::Index>(),
    ) {
        let mut packed = zlib::compress(&data, Compression::default()).unwrap();
        let i = pos.index(packed.len());
        packed[i] ^= 0xff;
        // Either zlib notices (stream error or adler32 mismatch) or, in the
        // rare case the flip lands in a don't-care bit, the data is intact.
        if let Ok(out) = zlib::decompress(&packed) {
            prop_assert_eq!(out, data);
        }
    }
}
