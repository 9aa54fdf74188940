//! Block/edge count projection
//!
//! Applies one matched profile record onto its program function: block
//! execution counts, successor edge counts, and call-site annotations, in
//! the block ordering the profile header declares. Index or offset drift
//! never aborts; every failed resolution is counted and skipped, and the
//! per-function verdict reflects whether the profile still fits the
//! function's current structure.

use crate::config::ReaderConfig;
use crate::model::{flags, FunctionProfile, ProfileHeader};
use crate::reader::{ReaderStats, StaleInference};
use crate::sample::Normalization;
use log::warn;
use opal_core::{BlockOrder, CallRecord, CallTarget, InstrKind, Program};

/// Session-wide inputs of the projection step, shared by every function.
pub(crate) struct Projection<'a> {
    pub config: &'a ReaderConfig,
    pub header: &'a ProfileHeader,
    pub normalization: Normalization,
    /// Profile id -> program function mapping, for callee resolution.
    pub mapping: &'a [Option<usize>],
}

impl Projection<'_> {
    fn block_order(&self) -> BlockOrder {
        if self.header.dfs_order {
            BlockOrder::DepthFirst
        } else {
            BlockOrder::Layout
        }
    }
}

/// Project `fp` onto `program[function_id]`. Returns the match verdict.
pub(crate) fn apply_profile(
    cx: &Projection<'_>,
    program: &mut Program,
    function_id: usize,
    fp: &FunctionProfile,
    stale: &dyn StaleInference,
    stats: &mut ReaderStats,
) -> bool {
    let sample_only = cx.header.flags & flags::SAMPLE != 0;
    let mut matched = true;
    let mut mismatched_blocks = 0u64;
    let mut mismatched_calls = 0u64;
    let mut mismatched_edges = 0u64;
    let mut function_exec_count = 0u64;

    // Callee symbols are resolved up front so the projection below can hold
    // the target function mutably without aliasing its callees (which may
    // include the function itself).
    let callee_symbols: Vec<Vec<Option<String>>> = fp
        .blocks
        .iter()
        .map(|bp| {
            bp.call_sites
                .iter()
                .map(|cs| {
                    cs.dest_id
                        .and_then(|id| cx.mapping.get(id as usize).copied().flatten())
                        .and_then(|callee| program.get(callee))
                        .and_then(|f| f.entry_symbol(cs.entry_discriminator))
                        .map(str::to_string)
                })
                .collect()
        })
        .collect();

    let function = &mut program[function_id];
    function.set_execution_count(Some(fp.exec_count));

    let raw_branch_count = fp
        .blocks
        .iter()
        .flat_map(|bp| bp.successors.iter())
        .map(|s| s.count)
        .sum();
    function.set_raw_branch_count(raw_branch_count);

    if function.is_empty() {
        return true;
    }

    if !cx.config.ignore_hash {
        let hash = match function.hash() {
            Some(hash) => hash,
            None => function.compute_hash(cx.block_order(), cx.header.hash_function),
        };
        if fp.hash != hash {
            if cx.config.verbosity >= 1 {
                warn!("function hash mismatch for {}", fp.name);
            }
            stats.hash_mismatches += 1;
            matched = false;
        }
    }

    if fp.num_blocks as usize != function.block_count() {
        if cx.config.verbosity >= 1 {
            warn!("number of basic blocks mismatch for {}", fp.name);
        }
        stats.block_count_mismatches += 1;
        matched = false;
    }

    // The index space profile block indices refer to.
    let order = function.block_order(cx.block_order());

    for (bp, symbols) in fp.blocks.iter().zip(&callee_symbols) {
        let Some(&source) = order.get(bp.index as usize) else {
            if cx.config.verbosity >= 2 {
                warn!("block index {} out of bounds in {}", bp.index, fp.name);
            }
            mismatched_blocks += 1;
            continue;
        };

        // Sample-only profiles have no branch records; blocks get pseudo
        // execution counts and nothing else.
        if sample_only {
            let event_count = bp.event_count.unwrap_or(0);
            if event_count == 0 {
                function.blocks[source].set_execution_count(0);
                continue;
            }
            let normalized = cx.normalization.normalize(
                event_count,
                function.blocks[source].num_non_pseudo(),
                function.blocks[source].num_calls(),
            );
            function.blocks[source].set_execution_count(normalized);
            if function.blocks[source].is_entry {
                function_exec_count += normalized;
            }
            continue;
        }

        function.blocks[source].set_execution_count(bp.exec_count);

        for (cs, symbol) in bp.call_sites.iter().zip(symbols) {
            // The raw record is kept regardless of validation below.
            function.add_call_record(CallRecord {
                callee: symbol.clone(),
                count: cs.count,
                mispredicted: cs.mispredicted,
                offset: cs.offset,
            });

            if cs.offset >= function.blocks[source].original_size {
                if cx.config.verbosity >= 2 {
                    warn!(
                        "call offset {} out of bounds in block {} of {}",
                        cs.offset, bp.index, fp.name
                    );
                }
                mismatched_calls += 1;
                continue;
            }

            let absolute = function.blocks[source].input_offset + cs.offset;
            let Some(instr) = function.instruction_at_offset(absolute) else {
                if cx.config.verbosity >= 2 {
                    warn!(
                        "no instruction at offset {} in block {} of {}",
                        cs.offset, bp.index, fp.name
                    );
                }
                mismatched_calls += 1;
                continue;
            };
            if !instr.kind.is_call() && instr.kind != InstrKind::IndirectBranch {
                if cx.config.verbosity >= 2 {
                    warn!(
                        "expected call at offset {} in block {} of {}",
                        cs.offset, bp.index, fp.name
                    );
                }
                mismatched_calls += 1;
                continue;
            }

            if instr.kind.is_indirect() {
                instr.add_call_target(CallTarget {
                    symbol: symbol.clone(),
                    count: cs.count,
                    mispredicted: cs.mispredicted,
                });
            } else if instr.kind == InstrKind::CondTailCall {
                if !instr.set_ctc_taken(cs.count) {
                    if cx.config.verbosity >= 1 {
                        warn!(
                            "ignoring duplicate tail-call count at offset {:#x} in {}",
                            cs.offset, fp.name
                        );
                    }
                    stats.duplicate_annotations += 1;
                }
                if !instr.set_ctc_mispredicted(cs.mispredicted) {
                    stats.duplicate_annotations += 1;
                }
            } else if !instr.set_count(cs.count) {
                if cx.config.verbosity >= 1 {
                    warn!(
                        "ignoring duplicate call count at offset {:#x} in {}",
                        cs.offset, fp.name
                    );
                }
                stats.duplicate_annotations += 1;
            }
        }

        for successor in &bp.successors {
            let Some(&target) = order.get(successor.index as usize) else {
                if cx.config.verbosity >= 1 {
                    warn!("successor index {} out of bounds in {}", successor.index, fp.name);
                }
                mismatched_edges += 1;
                continue;
            };

            let mut to = target;
            if !function.blocks[source].has_successor(target) {
                // Passthrough: a single-successor block interposed between
                // the source and the recorded target carries the count on
                // both hops.
                let hop = function.blocks[source].fallthrough_successor().filter(|&ft| {
                    function.blocks[ft].succ_count() == 1
                        && function.blocks[ft].has_successor(target)
                });
                match hop {
                    Some(ft) => {
                        if let Some(info) = function.blocks[ft].branch_info_mut(target) {
                            info.count += successor.count;
                            info.mispredicted += successor.mispredicted;
                        }
                        to = ft;
                    }
                    None => {
                        if cx.config.verbosity >= 1 {
                            warn!(
                                "no successor of block {} matches index {} in {}",
                                bp.index, successor.index, fp.name
                            );
                        }
                        mismatched_edges += 1;
                        continue;
                    }
                }
            }

            if let Some(info) = function.blocks[source].branch_info_mut(to) {
                info.count += successor.count;
                info.mispredicted += successor.mispredicted;
            }
        }
    }

    // Blocks the profile never mentioned ran zero times.
    for block in &mut function.blocks {
        if block.execution_count().is_none() {
            block.set_execution_count(0);
        }
    }

    if sample_only {
        function.set_execution_count(Some(function_exec_count));
    }

    matched &= mismatched_blocks == 0 && mismatched_calls == 0 && mismatched_edges == 0;
    stats.mismatched_blocks += mismatched_blocks;
    stats.mismatched_calls += mismatched_calls;
    stats.mismatched_edges += mismatched_edges;

    if !matched {
        if cx.config.verbosity >= 1 {
            warn!(
                "{} blocks, {} calls, and {} edges in profile did not match function {}",
                mismatched_blocks, mismatched_calls, mismatched_edges, fp.name
            );
        }
        if fp.num_blocks as usize == function.block_count() {
            stats.stale_funcs_with_equal_block_count += 1;
        }
        if cx.config.infer_stale_profile && stale.infer(function, fp) {
            matched = true;
        }
    }

    if matched {
        function.mark_profiled(cx.header.flags);
        stats.functions_profiled += 1;
    }

    matched
}
