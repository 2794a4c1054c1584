use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use atelier_auth::{
    GlobalRole, Membership, MembershipRole, Organization, PermissionSet, User, catalog, evaluate,
};
use atelier_core::{OrganizationId, UserId};
use chrono::Utc;

fn fixture(grants: usize) -> (User, Organization, Membership) {
    let now = Utc::now();
    let owner = User::register(UserId::new(), "owner@atelier.test", "Owner", GlobalRole::Owner, now)
        .expect("valid owner");
    let worker = User::register(UserId::new(), "worker@atelier.test", "Worker", GlobalRole::Worker, now)
        .expect("valid worker");
    let org = Organization::new(OrganizationId::new(), owner.id, "Bench", "bench".into(), now)
        .expect("valid organization");
    let mut membership = Membership::from_invitation(org.id, worker.id, MembershipRole::Worker, now);
    membership.permissions = catalog::ALL.iter().take(grants).cloned().collect::<PermissionSet>();
    (worker, org, membership)
}

fn bench_worker_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_worker");
    for grants in [0usize, 4, catalog::ALL.len()] {
        let (worker, org, membership) = fixture(grants);
        group.bench_with_input(BenchmarkId::from_parameter(grants), &grants, |b, _| {
            b.iter(|| {
                black_box(evaluate(
                    black_box(&worker),
                    black_box(&org),
                    Some(black_box(&membership)),
                    black_box(&catalog::WORKERS_MANAGE),
                ))
            })
        });
    }
    group.finish();
}

fn bench_outsider_denial(c: &mut Criterion) {
    let (worker, org, _) = fixture(0);
    c.bench_function("evaluate_outsider", |b| {
        b.iter(|| black_box(evaluate(black_box(&worker), black_box(&org), None, &catalog::ORDERS_READ)))
    });
}

criterion_group!(benches, bench_worker_evaluation, bench_outsider_denial);
criterion_main!(benches);
