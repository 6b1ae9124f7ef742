//! Throughput benchmarks for the hot paths: per-tick advance, state
//! hashing, partition assignment, and rollback resimulation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use synctick_core::hash::{hash_u32, hash_u64};
use synctick_core::observability::NullSink;
use synctick_core::partition;
use synctick_core::world::{Message, TickInput, World};
use synctick_core::{PeerId, SyncConfig, SyncEngine};

#[derive(Clone)]
struct BenchWorld {
    entities: Vec<u32>,
}

impl BenchWorld {
    fn new(entity_count: usize) -> Self {
        Self { entities: vec![0; entity_count] }
    }
}

impl World for BenchWorld {
    fn tick(&mut self, frame: u32, inputs: &[TickInput]) {
        for input in inputs {
            if let TickInput::Game { data, .. } = input {
                for (i, slot) in self.entities.iter_mut().enumerate() {
                    *slot = hash_u32(*slot, frame.wrapping_add(i as u32).wrapping_add(data.len() as u32));
                }
            }
        }
    }

    fn snapshot(&self) -> (Vec<u8>, u32) {
        let mut data = Vec::with_capacity(self.entities.len() * 4);
        for v in &self.entities {
            data.extend_from_slice(&v.to_le_bytes());
        }
        (data, self.state_hash())
    }

    fn load_snapshot(&mut self, data: &[u8]) {
        self.entities = data.chunks_exact(4).map(|c| u32::from_le_bytes(c.try_into().unwrap())).collect();
    }

    fn state_hash(&self) -> u32 {
        let mut h = 0u32;
        for (i, v) in self.entities.iter().enumerate() {
            h = hash_u32(h, i as u32);
            h = hash_u32(h, *v);
        }
        h
    }

    fn entity_count(&self) -> u32 {
        self.entities.len() as u32
    }

    fn entity_ids(&self) -> Vec<u64> {
        (0..self.entities.len() as u64).collect()
    }

    fn serialize_entities(&self, ids: &[u64]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ids.len() * 8);
        for &id in ids {
            out.extend_from_slice(&(id as u32).to_le_bytes());
            out.extend_from_slice(&self.entities[id as usize].to_le_bytes());
        }
        out
    }

    fn merge_entities(&mut self, _partition_id: u32, data: &[u8]) {
        for chunk in data.chunks_exact(8) {
            let id = u32::from_le_bytes(chunk[0..4].try_into().unwrap()) as usize;
            let value = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
            if id < self.entities.len() {
                self.entities[id] = value;
            }
        }
    }
}

fn benchmark_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash");

    group.bench_function("hash_u32_combine", |b| {
        b.iter(|| hash_u32(black_box(0x1234_5678), black_box(42)));
    });

    group.bench_function("hash_u64_combine", |b| {
        b.iter(|| hash_u64(black_box(0x1234_5678), black_box(0xdead_beef_cafe_babe)));
    });

    for entity_count in [100usize, 1_000, 10_000] {
        let world = BenchWorld::new(entity_count);
        group.throughput(Throughput::Elements(entity_count as u64));
        group.bench_with_input(
            BenchmarkId::new("state_hash", entity_count),
            &world,
            |b, world| {
                b.iter(|| world.state_hash());
            },
        );
    }

    group.finish();
}

fn benchmark_partition_assignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");

    for peer_count in [4usize, 16, 64] {
        let peers: Vec<PeerId> = (0..peer_count).map(|i| PeerId::new(format!("peer-{i}"))).collect();
        let reliability = |_: &PeerId| 75u8;
        group.bench_with_input(
            BenchmarkId::new("assign_1000_entities", peer_count),
            &peers,
            |b, peers| {
                b.iter(|| partition::assign(black_box(1000), peers, black_box(7), reliability, 2));
            },
        );
    }

    group.finish();
}

fn benchmark_engine_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    for entity_count in [50usize, 500] {
        group.bench_with_input(
            BenchmarkId::new("advance_steady_state", entity_count),
            &entity_count,
            |b, &entity_count| {
                let config = SyncConfig::default();
                let mut engine = SyncEngine::new(config, PeerId::new("bench"), Box::new(NullSink)).unwrap();
                let mut world = BenchWorld::new(entity_count);
                b.iter(|| {
                    engine.advance(black_box(&mut world), 0).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn benchmark_rollback(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollback");

    group.bench_function("misprediction_10_frame_resimulation", |b| {
        b.iter(|| {
            let config = SyncConfig { input_delay_frames: 0, max_prediction_frames: 32, ..SyncConfig::default() };
            let mut engine = SyncEngine::new(config, PeerId::new("a"), Box::new(NullSink)).unwrap();
            let peer_b = PeerId::new("b");
            engine.add_known_peer(peer_b.clone(), 0);
            let mut world = BenchWorld::new(100);

            for frame in 0..10i64 {
                engine.advance(&mut world, frame).unwrap();
            }
            engine.enqueue(
                peer_b.clone(),
                Message::Tick { frame: 1, inputs: vec![(peer_b.clone(), vec![1, 2, 3])], majority_hash: None },
            );
            engine.advance(black_box(&mut world), 10).unwrap();
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1));
    targets =
        benchmark_hashing,
        benchmark_partition_assignment,
        benchmark_engine_advance,
        benchmark_rollback
}

criterion_main!(benches);
