use super::*;
use proptest::prelude::*;

#[test]
fn rejects_byte_length_mismatch() {
    let err = Tensor::new(DType::Float32, vec![2], vec![0u8; 3]).unwrap_err();
    assert!(matches!(err, DaemonError::InvalidTensor(_)));
}

#[test]
fn encode_decode_round_trip_float32() {
    let t = Tensor::new(DType::Float32, vec![2], 1.0f32.to_le_bytes().iter().chain(2.0f32.to_le_bytes().iter()).copied().collect()).unwrap();
    let wire = t.encode();
    let back = Tensor::decode(&wire).unwrap();
    assert_eq!(t, back);
}

#[test]
fn decode_rejects_invalid_base64() {
    let wire = WireTensor { dtype: DType::Int8, shape: vec![1], data: "not base64!!".into() };
    assert!(Tensor::decode(&wire).is_err());
}

fn dtype_strategy() -> impl Strategy<Value = DType> {
    prop_oneof![
        Just(DType::Int8),
        Just(DType::Int16),
        Just(DType::Int32),
        Just(DType::Int64),
        Just(DType::Uint8),
        Just(DType::Uint16),
        Just(DType::Uint32),
        Just(DType::Uint64),
        Just(DType::Float16),
        Just(DType::Float32),
        Just(DType::Float64),
        Just(DType::Float128),
    ]
}

proptest! {
    #[test]
    fn round_trip_any_dtype_and_shape(
        dtype in dtype_strategy(),
        dims in prop::collection::vec(1u64..4, 1..3),
        seed in any::<u64>(),
    ) {
        let count: u64 = dims.iter().product();
        let byte_len = (count * dtype.item_size() as u64) as usize;
        let mut data = Vec::with_capacity(byte_len);
        let mut state = seed;
        for _ in 0..byte_len {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((state >> 56) as u8);
        }
        let t = Tensor::new(dtype, dims, data).unwrap();
        let wire = t.encode();
        let back = Tensor::decode(&wire).unwrap();
        prop_assert_eq!(t, back);
    }
}
