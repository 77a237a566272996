//! Serialization round-trip tests, including property-based coverage.

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::model::{
    BasicBlock, BinOp, BlockId, CastKind, Constant, Inst, MirEnum, MirFunction, MirModule,
    MirStruct, MirType, Operand, Terminator, ValueId,
};
use crate::serialize::{
    deserialize_binary, deserialize_text, serialize_binary, serialize_text, DeserializeError,
    MAGIC,
};

fn sample_module() -> MirModule {
    let mut module = MirModule::new("demo");
    // A monomorphized generic struct, an enum with payload, a function:
    // the shape the round-trip invariant is exercised against.
    module.structs.push(MirStruct {
        name: "List__I64".into(),
        fields: vec![("handle".into(), MirType::ptr_to(MirType::U8))],
    });
    module.enums.push(MirEnum {
        name: "Maybe__I64".into(),
        variants: vec![
            ("Just".into(), vec![MirType::I64]),
            ("Nothing".into(), vec![]),
        ],
    });
    module.functions.push(MirFunction {
        name: "add".into(),
        params: vec![("a".into(), MirType::I32), ("b".into(), MirType::I32)],
        ret: MirType::I32,
        blocks: vec![BasicBlock {
            id: BlockId(0),
            instructions: vec![Inst::Binary {
                dst: ValueId(2),
                op: BinOp::Add,
                ty: MirType::I32,
                lhs: Operand::Value(ValueId(0)),
                rhs: Operand::Value(ValueId(1)),
            }],
            terminator: Terminator::Ret(Some(Operand::Value(ValueId(2)))),
        }],
        is_external: false,
    });
    module.functions.push(MirFunction {
        name: "sin".into(),
        params: vec![("x".into(), MirType::F64)],
        ret: MirType::F64,
        blocks: Vec::new(),
        is_external: true,
    });
    module
        .constants
        .push(("answer".into(), Constant::Int(42)));
    module
        .constants
        .push(("pi".into(), Constant::Float(std::f64::consts::PI.to_bits())));
    module
}

#[test]
fn binary_round_trip_preserves_module() {
    let module = sample_module();
    let bytes = serialize_binary(&module);
    let restored = deserialize_binary(&bytes).expect("well-formed");
    assert_eq!(restored, module);
}

#[test]
fn binary_reserialization_is_bitwise_stable() {
    let module = sample_module();
    let first = serialize_binary(&module);
    let restored = deserialize_binary(&first).expect("well-formed");
    let second = serialize_binary(&restored);
    assert_eq!(first, second);
}

#[test]
fn empty_module_round_trips() {
    let module = MirModule::new("");
    let bytes = serialize_binary(&module);
    let restored = deserialize_binary(&bytes).expect("well-formed");
    assert_eq!(restored, module);
}

#[test]
fn text_round_trip_preserves_module() {
    let module = sample_module();
    let text = serialize_text(&module);
    let restored = deserialize_text(&text).expect("well-formed text");
    assert_eq!(restored, module);
}

#[test]
fn newer_minor_version_is_rejected() {
    let module = MirModule::new("m");
    let mut bytes = serialize_binary(&module);
    // Bump the minor version past the reader's.
    bytes[6] = 0xFF;
    bytes[7] = 0x7F;
    match deserialize_binary(&bytes) {
        Err(DeserializeError::Version { .. }) => {}
        other => panic!("expected version error, got {other:?}"),
    }
}

#[test]
fn different_major_version_is_rejected() {
    let module = MirModule::new("m");
    let mut bytes = serialize_binary(&module);
    bytes[4] = 9;
    assert!(matches!(
        deserialize_binary(&bytes),
        Err(DeserializeError::Version { major: 9, .. })
    ));
}

#[test]
fn bad_magic_is_corrupt() {
    let bytes = b"NOPE\x01\x00\x00\x00".to_vec();
    assert!(matches!(
        deserialize_binary(&bytes),
        Err(DeserializeError::Corrupt { offset: 0, .. })
    ));
}

#[test]
fn truncated_input_reports_eof() {
    let module = sample_module();
    let bytes = serialize_binary(&module);
    let truncated = &bytes[..bytes.len() / 2];
    assert!(matches!(
        deserialize_binary(truncated),
        Err(DeserializeError::Eof { .. }) | Err(DeserializeError::Corrupt { .. })
    ));
}

#[test]
fn trailing_garbage_is_corrupt() {
    let module = MirModule::new("m");
    let mut bytes = serialize_binary(&module);
    bytes.push(0xAB);
    assert!(matches!(
        deserialize_binary(&bytes),
        Err(DeserializeError::Corrupt { .. })
    ));
}

#[test]
fn file_round_trip_detects_format_by_magic() {
    let module = sample_module();
    let dir = tempfile::tempdir().expect("tempdir");

    let binary_path = dir.path().join("out.mirb");
    crate::serialize::write_mir_file(&binary_path, &module, true).expect("write binary");
    let restored = crate::serialize::read_mir_file(&binary_path).expect("read binary");
    assert_eq!(restored, module);

    let text_path = dir.path().join("out.mir");
    crate::serialize::write_mir_file(&text_path, &module, false).expect("write text");
    let restored = crate::serialize::read_mir_file(&text_path).expect("read text");
    assert_eq!(restored, module);

    // The binary file leads with the magic; the text file does not.
    let bytes = std::fs::read(&binary_path).expect("raw bytes");
    assert_eq!(&bytes[..4], &MAGIC);
}

#[test]
fn text_parse_error_carries_line_number() {
    let text = "; MIR Module: demo\n\nfunc @f() -> I32 {\nbb0:\n    %0 = frobnicate I32\n    ret\n}\n";
    let err = deserialize_text(text).expect_err("unknown instruction");
    assert_eq!(err.line, 5);
    assert!(err.message.contains("frobnicate"));
}

// === Property-based round trips ===

fn ident_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,10}"
}

fn mir_type_strategy() -> impl Strategy<Value = MirType> {
    let leaf = prop_oneof![
        Just(MirType::I8),
        Just(MirType::I32),
        Just(MirType::I64),
        Just(MirType::U64),
        Just(MirType::F64),
        Just(MirType::Bool),
        Just(MirType::Str),
        Just(MirType::Unit),
        ident_strategy().prop_map(MirType::Named),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(MirType::ptr_to),
            (inner.clone(), 0u64..32).prop_map(|(t, n)| MirType::Array(Box::new(t), n)),
            prop::collection::vec(inner.clone(), 0..4).prop_map(MirType::Tuple),
            (prop::collection::vec(inner.clone(), 0..3), inner).prop_map(|(params, ret)| {
                MirType::Func {
                    params,
                    ret: Box::new(ret),
                }
            }),
        ]
    })
}

fn constant_strategy() -> impl Strategy<Value = Constant> {
    prop_oneof![
        any::<i64>().prop_map(Constant::Int),
        any::<u64>().prop_map(Constant::Float),
        any::<bool>().prop_map(Constant::Bool),
        "[ -~]{0,20}".prop_map(Constant::Str),
        Just(Constant::Unit),
    ]
}

fn operand_strategy() -> impl Strategy<Value = Operand> {
    prop_oneof![
        (0u32..64).prop_map(|v| Operand::Value(ValueId(v))),
        constant_strategy().prop_map(Operand::Const),
    ]
}

fn inst_strategy() -> impl Strategy<Value = Inst> {
    prop_oneof![
        (
            0u32..64,
            prop_oneof![Just(BinOp::Add), Just(BinOp::FMul), Just(BinOp::Eq)],
            mir_type_strategy(),
            operand_strategy(),
            operand_strategy(),
        )
            .prop_map(|(dst, op, ty, lhs, rhs)| Inst::Binary {
                dst: ValueId(dst),
                op,
                ty,
                lhs,
                rhs,
            }),
        (0u32..64, mir_type_strategy()).prop_map(|(dst, ty)| Inst::Alloca {
            dst: ValueId(dst),
            ty,
        }),
        (mir_type_strategy(), operand_strategy(), operand_strategy()).prop_map(
            |(ty, ptr, value)| Inst::Store { ty, ptr, value }
        ),
        (
            proptest::option::of(0u32..64),
            ident_strategy(),
            mir_type_strategy(),
            prop::collection::vec(operand_strategy(), 0..4),
        )
            .prop_map(|(dst, func, ty, args)| Inst::Call {
                dst: dst.map(ValueId),
                func,
                ty,
                args,
            }),
        (
            0u32..64,
            prop_oneof![Just(CastKind::SignExtend), Just(CastKind::Truncate)],
            mir_type_strategy(),
            mir_type_strategy(),
            operand_strategy(),
        )
            .prop_map(|(dst, kind, from, to, value)| Inst::Cast {
                dst: ValueId(dst),
                kind,
                from,
                to,
                value,
            }),
    ]
}

fn terminator_strategy() -> impl Strategy<Value = Terminator> {
    prop_oneof![
        (0u32..4).prop_map(|b| Terminator::Br(BlockId(b))),
        proptest::option::of(operand_strategy()).prop_map(Terminator::Ret),
        Just(Terminator::Unreachable),
    ]
}

fn module_strategy() -> impl Strategy<Value = MirModule> {
    let function = (
        ident_strategy(),
        prop::collection::vec((ident_strategy(), mir_type_strategy()), 0..3),
        mir_type_strategy(),
        prop::collection::vec(
            (prop::collection::vec(inst_strategy(), 0..5), terminator_strategy()),
            0..3,
        ),
    )
        .prop_map(|(name, params, ret, blocks)| MirFunction {
            name,
            params,
            ret,
            is_external: blocks.is_empty(),
            blocks: blocks
                .into_iter()
                .enumerate()
                .map(|(index, (instructions, terminator))| BasicBlock {
                    id: BlockId(index as u32),
                    instructions,
                    terminator,
                })
                .collect(),
        });

    (
        ident_strategy(),
        prop::collection::vec(
            (
                ident_strategy(),
                prop::collection::vec((ident_strategy(), mir_type_strategy()), 0..4),
            ),
            0..3,
        ),
        prop::collection::vec(
            (
                ident_strategy(),
                prop::collection::vec(
                    (ident_strategy(), prop::collection::vec(mir_type_strategy(), 0..3)),
                    0..3,
                ),
            ),
            0..2,
        ),
        prop::collection::vec(function, 0..3),
        prop::collection::vec((ident_strategy(), constant_strategy()), 0..3),
    )
        .prop_map(|(name, structs, enums, functions, constants)| MirModule {
            name,
            structs: structs
                .into_iter()
                .map(|(name, fields)| MirStruct { name, fields })
                .collect(),
            enums: enums
                .into_iter()
                .map(|(name, variants)| MirEnum { name, variants })
                .collect(),
            functions,
            constants,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn binary_round_trip_holds_for_arbitrary_modules(module in module_strategy()) {
        let bytes = serialize_binary(&module);
        let restored = deserialize_binary(&bytes).expect("round trip");
        prop_assert_eq!(restored, module);
    }

    #[test]
    fn binary_serialization_is_deterministic(module in module_strategy()) {
        prop_assert_eq!(serialize_binary(&module), serialize_binary(&module));
    }

    #[test]
    fn text_round_trip_holds_for_arbitrary_modules(module in module_strategy()) {
        let text = serialize_text(&module);
        let restored = deserialize_text(&text).expect("text round trip");
        prop_assert_eq!(restored, module);
    }
}
