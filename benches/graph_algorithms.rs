use std::collections::HashSet;
use std::hint::black_box;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use uuid::Uuid;

use depgraph::algorithms::{detect_cycle, traverse};
use depgraph::index::GraphIndex;
use depgraph::models::{
    NodeId, Relationship, RelationshipDirection, RelationshipDraft, RelationshipStrength,
    RelationshipType, TraversalLimits,
};
use depgraph::store::EdgeStore;
use depgraph::store::memory::{MemoryEdgeStore, MemoryNodeDirectory};

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

fn edge(source: NodeId, target: NodeId) -> Relationship {
    Relationship::create(
        RelationshipDraft {
            source_id: source,
            target_id: target,
            relationship_type: RelationshipType::Dependency,
            direction: RelationshipDirection::Unidirectional,
            strength: RelationshipStrength::Strong,
            description: None,
        },
        Utc::now().naive_utc(),
    )
}

/// Random acyclic graph: edges always point from a lower index to a higher
/// one, so cycle detection walks the whole reachable set.
fn synthetic_dag(
    rt: &Runtime,
    node_count: usize,
    edge_count: usize,
) -> (MemoryEdgeStore, MemoryNodeDirectory, Vec<NodeId>) {
    let ids = (0..node_count)
        .map(|idx| NodeId(Uuid::from_u128((idx as u128) + 1)))
        .collect::<Vec<_>>();

    let store = MemoryEdgeStore::new();
    let nodes = MemoryNodeDirectory::new();

    rt.block_on(async {
        for (idx, id) in ids.iter().enumerate() {
            nodes.add_node(*id, format!("node-{idx}")).await;
        }

        let mut state = 0x1234_5678_9abc_def0u64;
        let mut seen = HashSet::with_capacity(edge_count);
        let mut inserted = 0usize;
        while inserted < edge_count {
            let a = (lcg_next(&mut state) as usize) % node_count;
            let b = (lcg_next(&mut state) as usize) % node_count;
            if a == b {
                continue;
            }
            let (from, to) = if a < b { (a, b) } else { (b, a) };
            if seen.insert((from, to)) {
                store.insert(&edge(ids[from], ids[to])).await.unwrap();
                inserted += 1;
            }
        }
    });

    (store, nodes, ids)
}

fn bench_detect_cycle(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("detect_cycle");
    for (node_count, edge_count) in [(1_000usize, 3_000usize), (3_000usize, 9_000usize)] {
        let (store, nodes, ids) = synthetic_dag(&rt, node_count, edge_count);
        let limits = TraversalLimits {
            max_nodes: node_count,
        };

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("dag", format!("{node_count}n_{edge_count}e")),
            &(store, nodes, ids),
            |b, (store, nodes, ids)| {
                let mut seed = 42u64;
                b.iter(|| {
                    let start = ids[(lcg_next(&mut seed) as usize) % ids.len()];
                    let index = GraphIndex::new(store);
                    let result = rt
                        .block_on(detect_cycle(&index, nodes, start, limits))
                        .unwrap();
                    black_box(result.has_cycle);
                });
            },
        );
    }
    group.finish();
}

fn bench_traverse(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("traverse");
    for (node_count, edge_count) in [(1_000usize, 3_000usize), (3_000usize, 9_000usize)] {
        let (store, nodes, ids) = synthetic_dag(&rt, node_count, edge_count);
        let limits = TraversalLimits {
            max_nodes: node_count,
        };

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("depth_5", format!("{node_count}n_{edge_count}e")),
            &(store, nodes, ids),
            |b, (store, nodes, ids)| {
                let mut seed = 7u64;
                b.iter(|| {
                    let start = ids[(lcg_next(&mut seed) as usize) % ids.len()];
                    let index = GraphIndex::new(store);
                    let result = rt
                        .block_on(traverse(&index, nodes, start, 5, limits))
                        .unwrap();
                    black_box(result.total_nodes);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(graph_algorithms, bench_detect_cycle, bench_traverse);
criterion_main!(graph_algorithms);
