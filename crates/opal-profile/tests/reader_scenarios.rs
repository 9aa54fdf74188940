//! End-to-end profile-load scenarios

use opal_core::{BasicBlock, BlockOrder, Function, HashFunction, InstrKind, Instruction, Program};
use opal_profile::{
    flags, BlockProfile, FunctionProfile, ProfileDocument, ProfileHeader, ProfileReader,
    ReaderConfig, StaleInference, SuccessorProfile,
};

fn chain_function(name: &str, num_blocks: usize) -> Function {
    let mut f = Function::new(name);
    for i in 0..num_blocks {
        let mut block = BasicBlock::new(i as u64 * 8, 8);
        if i + 1 < num_blocks {
            block.add_successor(i + 1);
        }
        f.push_block(block);
    }
    f
}

fn header() -> ProfileHeader {
    ProfileHeader {
        version: 1,
        hash_function: HashFunction::Legacy,
        event_names: "cycles".to_string(),
        dfs_order: false,
        flags: flags::BRANCH,
    }
}

fn record(id: u32, name: &str, num_blocks: u32, hash: u64, exec_count: u64) -> FunctionProfile {
    FunctionProfile {
        id,
        name: name.to_string(),
        hash,
        num_blocks,
        exec_count,
        used: false,
        blocks: (0..num_blocks)
            .map(|i| BlockProfile {
                index: i,
                exec_count,
                event_count: None,
                successors: if i + 1 < num_blocks {
                    vec![SuccessorProfile {
                        index: i + 1,
                        count: exec_count,
                        mispredicted: 0,
                    }]
                } else {
                    vec![]
                },
                call_sites: vec![],
            })
            .collect(),
    }
}

#[test]
fn identical_function_matches_cleanly() {
    let mut program = Program::new();
    let foo = program.add_function(chain_function("foo", 2));
    let hash = chain_function("foo", 2).compute_hash(BlockOrder::Layout, HashFunction::Legacy);

    let doc = ProfileDocument {
        header: header(),
        functions: vec![record(0, "foo", 2, hash, 40)],
    };
    let mut reader = ProfileReader::from_document(doc, ReaderConfig::default()).unwrap();
    reader.preprocess(&mut program);
    let stats = reader.read_profile(&mut program);

    assert_eq!(stats.matched_with_exact_name, 1);
    assert_eq!(stats.hash_mismatches, 0);
    assert_eq!(stats.block_count_mismatches, 0);
    assert_eq!(stats.mismatched_blocks, 0);
    assert_eq!(stats.mismatched_edges, 0);
    assert_eq!(stats.unused_profiled_objects, 0);
    assert_eq!(stats.functions_profiled, 1);

    assert_eq!(reader.function_for_profile(0), Some(foo));
    let f = &program[foo];
    assert_eq!(f.profile_flags(), Some(flags::BRANCH));
    assert_eq!(f.execution_count(), Some(40));
    assert_eq!(f.blocks[0].execution_count(), Some(40));
    assert_eq!(f.blocks[0].successors()[0].info.count, 40);
    assert_eq!(f.raw_branch_count(), 40);
}

#[test]
fn recompiled_function_is_matched_but_flagged() {
    let mut program = Program::new();
    let bar = program.add_function(chain_function("bar", 4));

    // Collected against a five-block version of the function.
    let doc = ProfileDocument {
        header: header(),
        functions: vec![record(0, "bar", 5, 0xfeed, 10)],
    };
    let mut reader = ProfileReader::from_document(doc, ReaderConfig::default()).unwrap();
    reader.preprocess(&mut program);
    let stats = reader.read_profile(&mut program).clone();

    // Name identity still produced a mapping...
    assert_eq!(stats.matched_with_lenient_name, 1);
    assert_eq!(reader.function_for_profile(0), Some(bar));
    // ...but the drift is on the books and the verdict failed.
    assert_eq!(stats.hash_mismatches, 1);
    assert_eq!(stats.block_count_mismatches, 1);
    assert_eq!(stats.mismatched_blocks, 1); // block index 4 of the old layout
    assert_eq!(stats.functions_profiled, 0);
    assert_eq!(program[bar].profile_flags(), None);
}

#[test]
fn stale_inference_repairs_recompiled_function() {
    struct AlwaysRepair;
    impl StaleInference for AlwaysRepair {
        fn infer(&self, _function: &mut Function, _profile: &FunctionProfile) -> bool {
            true
        }
    }

    let mut program = Program::new();
    let bar = program.add_function(chain_function("bar", 4));
    let doc = ProfileDocument {
        header: header(),
        functions: vec![record(0, "bar", 5, 0xfeed, 10)],
    };
    let config = ReaderConfig {
        infer_stale_profile: true,
        ..Default::default()
    };
    let mut reader = ProfileReader::from_document(doc, config)
        .unwrap()
        .with_stale_inference(Box::new(AlwaysRepair));
    reader.preprocess(&mut program);
    let stats = reader.read_profile(&mut program);

    assert_eq!(stats.functions_profiled, 1);
    assert_eq!(program[bar].profile_flags(), Some(flags::BRANCH));
}

#[test]
fn sample_only_profile_derives_pseudo_counts() {
    let mut program = Program::new();
    let mut f = Function::new("sampled");
    let mut b0 = BasicBlock::new(0, 16);
    for i in 0..4 {
        b0.push_instruction(Instruction::new(i * 4, InstrKind::Other));
    }
    f.push_block(b0).push_block(BasicBlock::new(16, 8));
    let sampled = program.add_function(f);
    let hash = program[sampled]
        .clone_shape_hash();

    let mut doc = ProfileDocument {
        header: ProfileHeader {
            flags: flags::SAMPLE,
            ..header()
        },
        functions: vec![FunctionProfile {
            id: 0,
            name: "sampled".to_string(),
            hash,
            num_blocks: 2,
            exec_count: 9999,
            used: false,
            blocks: vec![
                BlockProfile {
                    index: 0,
                    exec_count: 0,
                    event_count: Some(2),
                    successors: vec![],
                    call_sites: vec![],
                },
                BlockProfile {
                    index: 1,
                    exec_count: 0,
                    event_count: Some(0),
                    successors: vec![],
                    call_sites: vec![],
                },
            ],
        }],
    };
    doc.header.event_names = "cycles".to_string();

    let mut reader = ProfileReader::from_document(doc, ReaderConfig::default()).unwrap();
    reader.preprocess(&mut program);
    let stats = reader.read_profile(&mut program);

    assert_eq!(stats.functions_profiled, 1);
    let f = &program[sampled];
    // 2 events * 1000 / 4 non-pseudo instructions.
    assert_eq!(f.blocks[0].execution_count(), Some(500));
    assert_eq!(f.blocks[1].execution_count(), Some(0));
    // The declared function count is replaced by the entry-block sum.
    assert_eq!(f.execution_count(), Some(500));
}

#[test]
fn dfs_order_changes_the_index_space() {
    // Diamond: 0 -> {1, 2}, 1 -> 3, 2 -> 3; DFS order is [0, 1, 3, 2].
    let diamond = || {
        let mut f = Function::new("diamond");
        let mut b0 = BasicBlock::new(0, 8);
        b0.add_successor(1).add_successor(2);
        let mut b1 = BasicBlock::new(8, 4);
        b1.add_successor(3);
        let mut b2 = BasicBlock::new(12, 4);
        b2.add_successor(3);
        f.push_block(b0)
            .push_block(b1)
            .push_block(b2)
            .push_block(BasicBlock::new(16, 4));
        f
    };
    let mut program = Program::new();
    let id = program.add_function(diamond());
    let hash = diamond().compute_hash(BlockOrder::DepthFirst, HashFunction::Legacy);

    let doc = ProfileDocument {
        header: ProfileHeader {
            dfs_order: true,
            ..header()
        },
        functions: vec![FunctionProfile {
            id: 0,
            name: "diamond".to_string(),
            hash,
            num_blocks: 4,
            exec_count: 1,
            used: false,
            blocks: vec![BlockProfile {
                index: 2, // third block in DFS order, i.e. layout block 3
                exec_count: 42,
                event_count: None,
                successors: vec![],
                call_sites: vec![],
            }],
        }],
    };

    let mut reader = ProfileReader::from_document(doc, ReaderConfig::default()).unwrap();
    reader.preprocess(&mut program);
    let stats = reader.read_profile(&mut program);

    assert_eq!(stats.matched_with_exact_name, 1);
    assert_eq!(stats.mismatched_blocks, 0);
    assert_eq!(program[id].blocks[3].execution_count(), Some(42));
    assert_eq!(program[id].blocks[2].execution_count(), Some(0));
}

#[test]
fn unmatched_profiles_are_counted_unused() {
    let mut program = Program::new();
    program.add_function(chain_function("present", 2));
    let hash = chain_function("present", 2).compute_hash(BlockOrder::Layout, HashFunction::Legacy);

    let doc = ProfileDocument {
        header: header(),
        functions: vec![
            record(0, "present", 2, hash, 5),
            record(1, "deleted_function", 2, 0x9999, 5),
        ],
    };
    let mut reader = ProfileReader::from_document(doc, ReaderConfig::default()).unwrap();
    reader.preprocess(&mut program);
    let stats = reader.read_profile(&mut program);

    assert_eq!(stats.matched_with_exact_name, 1);
    assert_eq!(stats.unused_profiled_objects, 1);
    assert!(!reader.document().functions[1].used);
}

#[test]
fn hash_matching_finds_renamed_functions_and_lite_drops_the_rest() {
    let mut program = Program::new();
    let renamed = program.add_function(chain_function("new_name", 3));
    let unprofiled = program.add_function(chain_function("never_run", 7));
    let hash = chain_function("x", 3).compute_hash(BlockOrder::Layout, HashFunction::Legacy);

    let doc = ProfileDocument {
        header: header(),
        functions: vec![record(0, "old_name", 3, hash, 8)],
    };
    let config = ReaderConfig {
        match_with_function_hash: true,
        lite: true,
        ..Default::default()
    };
    let mut reader = ProfileReader::from_document(doc, config).unwrap();
    reader.preprocess(&mut program);
    let stats = reader.read_profile(&mut program);

    assert_eq!(stats.matched_with_hash, 1);
    assert_eq!(reader.function_for_profile(0), Some(renamed));
    assert!(!program[renamed].is_ignored());
    assert!(program[unprofiled].is_ignored());

    // Under hash matching any function may still receive data.
    assert!(reader.may_have_profile_data(&program[unprofiled]));
}

#[test]
fn lto_privatized_clones_match_through_common_names() {
    let mut program = Program::new();
    let clone = program.add_function(chain_function("compute.lto_priv.1", 4));

    let doc = ProfileDocument {
        header: header(),
        functions: vec![
            record(0, "compute.lto_priv.7", 9, 0x111, 3),
            record(1, "compute.lto_priv.8", 9, 0x222, 4),
        ],
    };
    let mut reader = ProfileReader::from_document(doc, ReaderConfig::default()).unwrap();
    reader.preprocess(&mut program);
    let stats = reader.read_profile(&mut program).clone();

    // The single unclaimed candidate took the first record; the other
    // stayed unused.
    assert_eq!(stats.matched_with_lto_common_name, 1);
    assert_eq!(reader.function_for_profile(0), Some(clone));
    assert_eq!(reader.function_for_profile(1), None);
    assert_eq!(stats.unused_profiled_objects, 1);
}

/// Hash helper for functions already inside a program.
trait ShapeHash {
    fn clone_shape_hash(&self) -> u64;
}

impl ShapeHash for Function {
    fn clone_shape_hash(&self) -> u64 {
        self.clone().compute_hash(BlockOrder::Layout, HashFunction::Legacy)
    }
}
