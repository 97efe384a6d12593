use sbm_core::SbmError;
use sbm_graph::{AdjGraph, EdgeWeights, VertexWeights};
use sbm_state::{BlockState, EntropyArgs, StateConfig, StateInputs};

fn path_graph() -> AdjGraph {
    let mut g = AdjGraph::new(4, false);
    g.add_edge(0, 1).unwrap();
    g.add_edge(1, 2).unwrap();
    g.add_edge(2, 3).unwrap();
    g
}

fn path_state() -> BlockState {
    let cfg = StateConfig {
        block_count: 2,
        ..Default::default()
    };
    BlockState::new(path_graph(), vec![0, 0, 1, 1], StateInputs::default(), cfg).unwrap()
}

#[test]
fn path_partition_aggregates() {
    let state = path_state();
    // internal pairs carry twice the edge weight on the undirected diagonal
    assert_eq!(state.block_edge_count(0, 0), 2);
    assert_eq!(state.block_edge_count(0, 1), 1);
    assert_eq!(state.block_edge_count(1, 1), 2);
    assert_eq!(state.block_weight(0), 2);
    assert_eq!(state.block_weight(1), 2);
    assert_eq!(state.block_out_degree(0), 3);
    assert_eq!(state.block_out_degree(1), 3);
    assert!(state.check_edge_counts());
    assert!(state.check_node_counts());
}

#[test]
fn cross_edge_tracks_the_moved_vertex() {
    let mut state = path_state();
    state.move_vertex(1, 1).unwrap();
    // edge (0,1) is now the single cross edge; (1,2) and (2,3) are internal
    assert_eq!(state.block_edge_count(0, 0), 0);
    assert_eq!(state.block_edge_count(0, 1), 1);
    assert_eq!(state.block_edge_count(1, 1), 4);
    assert_eq!(state.block_weight(0), 1);
    assert_eq!(state.block_weight(1), 3);
    assert!(state.check_edge_counts());
    assert!(state.check_node_counts());
}

#[test]
fn round_trip_move_is_neutral() {
    let mut state = path_state();
    let args = EntropyArgs::default();
    let s0 = state.entropy(args).unwrap();
    let mrs0: Vec<i64> = vec![
        state.block_edge_count(0, 0),
        state.block_edge_count(0, 1),
        state.block_edge_count(1, 1),
    ];
    state.move_vertex(1, 1).unwrap();
    state.move_vertex(1, 0).unwrap();
    let mrs1: Vec<i64> = vec![
        state.block_edge_count(0, 0),
        state.block_edge_count(0, 1),
        state.block_edge_count(1, 1),
    ];
    assert_eq!(mrs0, mrs1);
    let s1 = state.entropy(args).unwrap();
    assert!((s1 - s0).abs() < 1e-9);
    assert!(state.check_edge_counts());
    assert!(state.check_node_counts());
}

#[test]
fn vacated_block_joins_the_empty_pool() {
    let mut state = path_state();
    state.move_vertex(0, 1).unwrap();
    state.move_vertex(1, 1).unwrap();
    assert_eq!(state.block_weight(0), 0);
    assert!(state.empty_blocks().contains(&0));
    // skip the leading sentinel entry
    assert!(!state.candidate_blocks()[1..].contains(&0));
    state.move_vertex(1, 0).unwrap();
    assert!(!state.empty_blocks().contains(&0));
    assert!(state.candidate_blocks()[1..].contains(&0));
    assert!(state.check_node_counts());
}

#[test]
fn detaching_a_vertex_updates_neighbour_degrees() {
    let mut state = path_state();
    state.remove_vertex(2).unwrap();
    // edge (1,2) no longer contributes to block 0's degree, and block 1
    // loses both of vertex 2's incidences
    assert_eq!(state.block_out_degree(0), 2);
    assert_eq!(state.block_out_degree(1), 0);
    assert_eq!(state.block_edge_count(0, 1), 0);
    assert_eq!(state.block_edge_count(1, 1), 0);
    assert!(state.check_edge_counts());
    state.add_vertex(2, 1).unwrap();
    assert_eq!(state.block_out_degree(0), 3);
    assert_eq!(state.block_out_degree(1), 3);
    assert!(state.check_edge_counts());
    assert!(state.check_node_counts());
}

#[test]
fn barrier_labels_block_moves() {
    let cfg = StateConfig {
        block_count: 2,
        ..Default::default()
    };
    let inputs = StateInputs {
        bclabel: Some(vec![0, 1]),
        ..Default::default()
    };
    let mut state = BlockState::new(path_graph(), vec![0, 0, 1, 1], inputs, cfg).unwrap();
    let err = state.move_vertex(1, 1).unwrap_err();
    assert!(matches!(err, SbmError::State(info) if info.code == "label-constraint"));
}

#[test]
fn empty_blocks_admit_any_barrier_label() {
    let cfg = StateConfig {
        block_count: 2,
        ..Default::default()
    };
    let inputs = StateInputs {
        bclabel: Some(vec![0, 1]),
        ..Default::default()
    };
    let mut state = BlockState::new(path_graph(), vec![0, 0, 0, 0], inputs, cfg).unwrap();
    // an empty block is a legal target no matter its label
    state.move_vertex(3, 1).unwrap();
    assert_eq!(state.block_weight(1), 1);
    // once occupied, the label constraint applies again
    let err = state.move_vertex(2, 1).unwrap_err();
    assert!(matches!(err, SbmError::State(info) if info.code == "label-constraint"));
}

#[test]
fn vacated_blocks_leave_the_candidate_pool_when_empties_are_kept() {
    let cfg = StateConfig {
        block_count: 2,
        allow_empty: true,
        ..Default::default()
    };
    let mut state =
        BlockState::new(path_graph(), vec![0, 0, 1, 1], StateInputs::default(), cfg).unwrap();
    state.move_vertex(2, 0).unwrap();
    state.move_vertex(3, 0).unwrap();
    assert_eq!(state.block_weight(1), 0);
    assert!(state.empty_blocks().contains(&1));
    assert!(!state.candidate_blocks()[1..].contains(&1));
    assert!(state.check_node_counts());
}

#[test]
fn unweighted_state_rejects_weight_updates() {
    let mut state = path_state();
    let err = state.set_vertex_weight(0, 2).unwrap_err();
    assert!(matches!(err, SbmError::State(info) if info.code == "unweighted-state"));
}

#[test]
fn bulk_ops_match_sequential_moves() {
    let mut bulk = path_state();
    bulk.remove_vertices(&[0, 1]).unwrap();
    bulk.add_vertices(&[0, 1], &[1, 1]).unwrap();

    let mut seq = path_state();
    seq.move_vertex(0, 1).unwrap();
    seq.move_vertex(1, 1).unwrap();

    for r in 0..2 {
        for s in r..2 {
            assert_eq!(bulk.block_edge_count(r, s), seq.block_edge_count(r, s));
        }
        assert_eq!(bulk.block_weight(r), seq.block_weight(r));
        assert_eq!(bulk.block_out_degree(r), seq.block_out_degree(r));
    }
    assert!(bulk.check_edge_counts());
    assert!(bulk.check_node_counts());
}

#[test]
fn merge_folds_edges_and_weights() {
    let cfg = StateConfig {
        block_count: 2,
        ..Default::default()
    };
    let inputs = StateInputs {
        vweight: VertexWeights::Map(vec![1; 4]),
        eweight: EdgeWeights::Map(vec![1; 3]),
        ..Default::default()
    };
    let mut state = BlockState::new(path_graph(), vec![0, 0, 1, 1], inputs, cfg).unwrap();
    state.merge_vertices(0, 1).unwrap();
    assert_eq!(state.merge_target(0), 1);
    assert_eq!(state.node_weight(0), 0);
    assert_eq!(state.node_weight(1), 2);
    // edge (0,1) became a self-loop on 1 and still counts twice on the diagonal
    assert_eq!(state.block_edge_count(0, 0), 2);
    assert_eq!(state.block_edge_count(0, 1), 1);
    assert_eq!(state.block_weight(0), 2);
    assert!(state.check_edge_counts());
    assert!(state.check_node_counts());
}

#[test]
fn merge_requires_weighted_state() {
    let mut state = path_state();
    let err = state.merge_vertices(0, 1).unwrap_err();
    assert!(matches!(err, SbmError::State(info) if info.code == "unweighted-state"));
}
