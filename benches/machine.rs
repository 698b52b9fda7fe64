use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use strand_vm::{CaseBlock, CaseKey, Machine, StepId, TaskQueue, Value};

fn chain_machine(len: u32) -> (Machine<u64>, TaskQueue) {
    let queue = TaskQueue::new();
    let machine = Machine::new(queue.clone(), 0u64, move |m, ctx, id, _| {
        let step = id.raw();
        if step >= len {
            m.callback(None, vec![Value::Int(*ctx as i64)]);
        } else {
            *ctx += 1;
            m.go_to(StepId::from_raw(step + 1));
        }
        Ok(())
    });
    (machine, queue)
}

fn bench_step_chain(c: &mut Criterion) {
    c.bench_function("chain_1000_steps", |b| {
        b.iter(|| {
            let (machine, queue) = chain_machine(1000);
            machine.start();
            queue.run_until_idle();
            assert!(machine.is_finished());
        })
    });
}

fn bench_switch_resolution(c: &mut Criterion) {
    let queue = TaskQueue::new();
    let machine = Machine::new(queue, 0u64, |_, _, _, _| Ok(()));
    let blocks: Vec<CaseBlock> = (0..64i64).map(|key| CaseBlock::new([key], 3)).collect();
    let table = machine.jump_table(StepId::from_raw(100), &blocks);

    c.bench_function("switch_resolution_64_cases", |b| {
        b.iter(|| {
            for key in 0..64i64 {
                black_box(table.step_id(&CaseKey::Int(key)));
            }
        })
    });
}

criterion_group!(benches, bench_step_chain, bench_switch_resolution);
criterion_main!(benches);
