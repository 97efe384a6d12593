use sbm_graph::{AdjGraph, VertexWeights};
use sbm_state::{BlockState, EntropyArgs, StateConfig, StateInputs, NULL_BLOCK};

fn path_graph() -> AdjGraph {
    let mut g = AdjGraph::new(4, false);
    for (u, v) in [(0, 1), (1, 2), (2, 3)] {
        g.add_edge(u, v).unwrap();
    }
    g
}

fn child_state() -> BlockState {
    let cfg = StateConfig {
        block_count: 2,
        ..Default::default()
    };
    BlockState::new(path_graph(), vec![0, 0, 1, 1], StateInputs::default(), cfg).unwrap()
}

// one parent vertex per child block, all starting occupied
fn parent_state(blocks: usize) -> BlockState {
    let cfg = StateConfig {
        block_count: 1,
        ..Default::default()
    };
    let inputs = StateInputs {
        vweight: VertexWeights::Map(vec![1; blocks]),
        ..Default::default()
    };
    BlockState::new(AdjGraph::new(blocks, false), vec![0; blocks], inputs, cfg).unwrap()
}

#[test]
fn vacating_a_block_detaches_its_parent_vertex() {
    let mut state = child_state();
    state.couple(parent_state(2), EntropyArgs::default());
    state.move_vertex(2, 0).unwrap();
    state.move_vertex(3, 0).unwrap();
    let parent = state.coupled_state().unwrap();
    assert_eq!(parent.partition()[1], NULL_BLOCK);
    assert_eq!(parent.node_weight(1), 0);
    assert_eq!(parent.block_weight(0), 1);
    assert!(parent.check_node_counts());
}

#[test]
fn occupying_a_block_reattaches_its_parent_vertex() {
    let mut state = child_state();
    state.couple(parent_state(2), EntropyArgs::default());
    state.move_vertex(2, 0).unwrap();
    state.move_vertex(3, 0).unwrap();
    state.move_vertex(3, 1).unwrap();
    let parent = state.coupled_state().unwrap();
    assert_eq!(parent.partition()[1], 0);
    assert_eq!(parent.node_weight(1), 1);
    assert_eq!(parent.block_weight(0), 2);
    assert!(parent.check_node_counts());
}

#[test]
fn recursive_virtual_move_matches_committed_entropy() {
    let args = EntropyArgs {
        recurse: true,
        ..Default::default()
    };
    let mut state = child_state();
    state.couple(parent_state(2), args);
    state.move_vertex(2, 0).unwrap();

    // vacate: the move empties block 1 and detaches parent vertex 1
    let r = state.block(3);
    let ds = state.virtual_move(3, r, 0, args).unwrap();
    let s0 = state.entropy(args).unwrap();
    state.move_vertex(3, 0).unwrap();
    let s1 = state.entropy(args).unwrap();
    assert!(
        (ds - (s1 - s0)).abs() < 1e-8,
        "vacate: priced {ds}, committed {}",
        s1 - s0
    );

    // occupy: the return move refills block 1 and reattaches the vertex
    let r = state.block(3);
    let ds = state.virtual_move(3, r, 1, args).unwrap();
    let s0 = s1;
    state.move_vertex(3, 1).unwrap();
    let s1 = state.entropy(args).unwrap();
    assert!(
        (ds - (s1 - s0)).abs() < 1e-8,
        "occupy: priced {ds}, committed {}",
        s1 - s0
    );
}

#[test]
fn simultaneous_vacate_and_occupy_swaps_parent_members() {
    let args = EntropyArgs {
        recurse: true,
        ..Default::default()
    };
    let cfg = StateConfig {
        block_count: 3,
        ..Default::default()
    };
    let mut state =
        BlockState::new(path_graph(), vec![0, 0, 1, 2], StateInputs::default(), cfg).unwrap();
    state.couple(parent_state(3), args);
    state.move_vertex(3, 1).unwrap();
    state.move_vertex(2, 0).unwrap();
    // block 1 now holds only vertex 3 and block 2 is empty, so this move
    // vacates one block and occupies another in a single step
    let r = state.block(3);
    let ds = state.virtual_move(3, r, 2, args).unwrap();
    let s0 = state.entropy(args).unwrap();
    state.move_vertex(3, 2).unwrap();
    let s1 = state.entropy(args).unwrap();
    assert!(
        (ds - (s1 - s0)).abs() < 1e-8,
        "priced {ds}, committed {}",
        s1 - s0
    );
    let parent = state.coupled_state().unwrap();
    assert_eq!(parent.partition()[1], NULL_BLOCK);
    assert_eq!(parent.partition()[2], 0);
    assert_eq!(parent.block_weight(0), 2);
    assert!(parent.check_node_counts());
}
