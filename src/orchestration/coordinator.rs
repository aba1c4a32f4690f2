// Mon Oct 19 2026 - Alex

use crate::engine::{
    batches, worker, ApplyJobParams, ChunkJobParams, CollectJobParams, CombineJobParams, JobOutput, JobParams,
    JobRunner, PipelineError, StageBarrier, StageContext, StageKind, StageOutcomes, StageReport, StageScheduler,
    StitchJobParams,
};
use crate::extraction::split_partner_key;
use crate::merge::{allocate, resolve, IdAllocation, MergeEdge, RemapTable};
use crate::orchestration::report::{ChannelReport, PartnerPair};
use crate::utils::{format_duration, scoped_timer, StageProgress};
use crate::volume::VolumeWriter;
use itertools::Itertools;
use log::{error, info};
use ndarray::s;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const EXTRACT: &str = "extract";
const ALLOCATE: &str = "allocate";
const STITCH: &str = "stitch";
const RESOLVE: &str = "resolve";
const APPLY: &str = "apply";
const EXPORT: &str = "export";
const COLLECT: &str = "collect";
const COMBINE: &str = "combine";

type PartnerVotes = BTreeMap<u32, BTreeMap<u64, u32>>;

/// Drives one channel through extract, allocate, stitch, resolve, apply,
/// (export,) collect and combine.
///
/// Each parallel step ends in a [`StageBarrier`]; the next step only starts
/// once every expected item has reported. Finished steps are recorded in the
/// channel's checkpoint and skipped when the run is restarted.
pub struct Coordinator {
    runner: Arc<dyn JobRunner>,
    export: Option<Arc<dyn VolumeWriter<u64>>>,
    export_created: bool,
    progress: bool,
}

impl Coordinator {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self {
            runner,
            export: None,
            export_created: false,
            progress: false,
        }
    }

    /// Also writes the final labels of every chunk core to `writer`.
    pub fn with_export(mut self, writer: Arc<dyn VolumeWriter<u64>>) -> Self {
        self.export = Some(writer);
        self
    }

    /// Like [`Coordinator::with_export`] for a target that was just created
    /// and holds no labels yet; a finished export step is written again.
    pub fn with_new_export(mut self, writer: Arc<dyn VolumeWriter<u64>>) -> Self {
        self.export = Some(writer);
        self.export_created = true;
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn run_channel(&self, ctx: &StageContext) -> Result<ChannelReport, PipelineError> {
        let mut report = ChannelReport::new(&ctx.channel, ctx.from_ids());
        let included = ctx.included_chunks();
        report.chunks = included.len();
        report.excluded_chunks = ctx.grid.chunk_count() - included.len();
        info!(
            "Channel '{}': {} chunks ({} excluded) on the {} runner",
            ctx.channel,
            report.chunks,
            report.excluded_chunks,
            self.runner.name()
        );

        if !ctx.from_ids() {
            let (counts, partners) = self.extract(ctx, &included, &mut report)?;
            let allocation = self.allocate(ctx, &included, &counts, &mut report)?;
            report.max_label = allocation.max_label;

            let edges = self.stitch(ctx, &included, &mut report)?;
            report.edges = edges.len();

            let remap = self.resolve(ctx, &included, &counts, &allocation, &edges, &mut report)?;
            report.merged_ids = remap.merged_count();
            report.partners = canonical_partners(&partners, &allocation, &remap);

            self.apply(ctx, &included, &mut report)?;
            if let Some(writer) = &self.export {
                self.export(ctx, &included, writer.as_ref(), &mut report)?;
            }
        }

        let buckets = self.collect(ctx, &included, &mut report)?;
        report.object_count = self.combine(ctx, &buckets, &mut report)?;
        info!(
            "Channel '{}' finished: {} objects in {}",
            ctx.channel,
            report.object_count,
            format_duration(report.total_duration())
        );
        Ok(report)
    }

    fn extract(
        &self,
        ctx: &StageContext,
        included: &[u32],
        report: &mut ChannelReport,
    ) -> Result<(BTreeMap<u32, u32>, PartnerVotes), PipelineError> {
        if ctx.checkpoint.is_done(EXTRACT) {
            if let (Some(counts), Some(partners)) = (ctx.checkpoint.load_counts()?, ctx.checkpoint.load_partners()?) {
                info!("{}: resumed {} local counts", EXTRACT, counts.len());
                mark_resumed(report, EXTRACT);
                return Ok((counts, partners));
            }
        }

        let params = batches(included, ctx.config.batch_size)
            .into_iter()
            .map(|chunk_ids| {
                JobParams::Extract(ChunkJobParams {
                    chunk_ids,
                    settings: ctx.settings.clone(),
                })
            })
            .collect();
        let mut barrier = StageBarrier::new(StageKind::Extract, ctx.grid.chunk_order().into_iter().map(u64::from));
        barrier.exclude(ctx.config.excluded_chunks.iter().map(|&id| u64::from(id)));

        let outcomes = self.schedule(ctx, StageKind::Extract, params, report.stage_mut(EXTRACT))?;
        for (_, output) in outcomes.outputs {
            if let JobOutput::Extract {
                local_counts,
                mut partners,
            } = output
            {
                for (chunk_id, count) in local_counts {
                    let votes = partners.remove(&chunk_id).unwrap_or_default();
                    barrier.record(u64::from(chunk_id), (count, votes));
                }
            }
        }

        let mut counts = BTreeMap::new();
        let mut partners = BTreeMap::new();
        for (chunk_id, (count, votes)) in close(barrier, report.stage_mut(EXTRACT))? {
            let chunk_id = chunk_id as u32;
            counts.insert(chunk_id, count);
            if !votes.is_empty() {
                partners.insert(chunk_id, votes);
            }
        }
        ctx.checkpoint.save_counts(&counts)?;
        ctx.checkpoint.save_partners(&partners)?;
        ctx.checkpoint.mark_done(EXTRACT)?;
        Ok((counts, partners))
    }

    fn allocate(
        &self,
        ctx: &StageContext,
        included: &[u32],
        counts: &BTreeMap<u32, u32>,
        report: &mut ChannelReport,
    ) -> Result<Arc<IdAllocation>, PipelineError> {
        if ctx.checkpoint.is_done(ALLOCATE) {
            if let Some(allocation) = ctx.checkpoint.load_allocation()? {
                mark_resumed(report, ALLOCATE);
                let allocation = Arc::new(allocation);
                ctx.publish_allocation(allocation.clone());
                return Ok(allocation);
            }
        }

        let stage = report.stage_mut(ALLOCATE);
        stage.start();
        let allocation = match allocate(included, counts) {
            Ok(allocation) => Arc::new(allocation),
            Err(e) => {
                stage.fail();
                return Err(e.into());
            }
        };
        // Worker processes read the bases from the checkpoint.
        ctx.checkpoint.save_allocation(&allocation)?;
        ctx.publish_allocation(allocation.clone());
        ctx.checkpoint.mark_done(ALLOCATE)?;
        stage.complete();
        info!(
            "{}: {} chunks, max label {}",
            ALLOCATE,
            allocation.bases.len(),
            allocation.max_label
        );
        Ok(allocation)
    }

    fn stitch(
        &self,
        ctx: &StageContext,
        included: &[u32],
        report: &mut ChannelReport,
    ) -> Result<BTreeSet<MergeEdge>, PipelineError> {
        if ctx.checkpoint.is_done(STITCH) {
            if let Some(edges) = ctx.checkpoint.load_edges()? {
                mark_resumed(report, STITCH);
                return Ok(edges);
            }
        }

        let included: BTreeSet<u32> = included.iter().copied().collect();
        let pairs: Vec<_> = ctx
            .grid
            .adjacent_pairs()
            .into_iter()
            .filter(|p| included.contains(&p.lower) && included.contains(&p.upper))
            .collect();
        let index: BTreeMap<(u32, u32), u64> = pairs
            .iter()
            .enumerate()
            .map(|(i, p)| ((p.lower, p.upper), i as u64))
            .collect();

        let params = batches(&pairs, ctx.config.batch_size)
            .into_iter()
            .map(|pairs| JobParams::Stitch(StitchJobParams { pairs }))
            .collect();
        let mut barrier = StageBarrier::new(StageKind::Stitch, 0..pairs.len() as u64);
        let mut edges = BTreeSet::new();

        let outcomes = self.schedule(ctx, StageKind::Stitch, params, report.stage_mut(STITCH))?;
        for (_, output) in outcomes.outputs {
            if let JobOutput::Stitch { pairs, edges: found } = output {
                for pair in pairs {
                    if let Some(&i) = index.get(&(pair.lower, pair.upper)) {
                        barrier.record(i, ());
                    }
                }
                edges.extend(found);
            }
        }
        close(barrier, report.stage_mut(STITCH))?;
        info!("{}: {} merge edges over {} pairs", STITCH, edges.len(), pairs.len());

        ctx.checkpoint.save_edges(&edges)?;
        ctx.checkpoint.mark_done(STITCH)?;
        Ok(edges)
    }

    fn resolve(
        &self,
        ctx: &StageContext,
        included: &[u32],
        counts: &BTreeMap<u32, u32>,
        allocation: &IdAllocation,
        edges: &BTreeSet<MergeEdge>,
        report: &mut ChannelReport,
    ) -> Result<Arc<RemapTable>, PipelineError> {
        if ctx.checkpoint.is_done(RESOLVE) {
            if let Some(remap) = ctx.checkpoint.load_remap()? {
                mark_resumed(report, RESOLVE);
                let remap = Arc::new(remap);
                ctx.publish_remap(remap.clone());
                return Ok(remap);
            }
        }

        let stage = report.stage_mut(RESOLVE);
        stage.start();
        let ids = included
            .iter()
            .filter_map(|&id| allocation.range(id, counts.get(&id).copied().unwrap_or(0)))
            .flatten();
        let remap = Arc::new(resolve(ids, edges.iter().copied()));
        ctx.checkpoint.save_remap(&remap)?;
        ctx.publish_remap(remap.clone());
        ctx.checkpoint.mark_done(RESOLVE)?;
        stage.complete();
        info!("{}: {} ids merged into smaller ones", RESOLVE, remap.merged_count());
        Ok(remap)
    }

    fn apply(&self, ctx: &StageContext, included: &[u32], report: &mut ChannelReport) -> Result<(), PipelineError> {
        if ctx.checkpoint.is_done(APPLY) {
            mark_resumed(report, APPLY);
            return Ok(());
        }

        let params = batches(included, ctx.config.batch_size)
            .into_iter()
            .map(|chunk_ids| JobParams::Apply(ApplyJobParams { chunk_ids }))
            .collect();
        let mut barrier = StageBarrier::new(StageKind::Apply, included.iter().map(|&id| u64::from(id)));

        let outcomes = self.schedule(ctx, StageKind::Apply, params, report.stage_mut(APPLY))?;
        for (_, output) in outcomes.outputs {
            if let JobOutput::Apply { chunk_ids } = output {
                for chunk_id in chunk_ids {
                    barrier.record(u64::from(chunk_id), ());
                }
            }
        }
        close(barrier, report.stage_mut(APPLY))?;
        ctx.checkpoint.mark_done(APPLY)?;
        Ok(())
    }

    fn export(
        &self,
        ctx: &StageContext,
        included: &[u32],
        writer: &dyn VolumeWriter<u64>,
        report: &mut ChannelReport,
    ) -> Result<(), PipelineError> {
        if ctx.checkpoint.is_done(EXPORT) && !self.export_created {
            mark_resumed(report, EXPORT);
            return Ok(());
        }

        let _timer = scoped_timer(EXPORT);
        let stage = report.stage_mut(EXPORT);
        stage.start();
        stage.batches = included.len();
        let progress = StageProgress::new(EXPORT, included.len() as u64, self.progress);
        let result = included.par_iter().try_for_each(|&chunk_id| {
            let core = ctx.grid.chunk(chunk_id)?.core();
            let labels = ctx.labels.get_final(chunk_id)?;
            let o: Vec<usize> = (0..3)
                .map(|d| (core.offset[d] - labels.window.offset[d]) as usize)
                .collect();
            let (sx, sy, sz) = core.shape();
            let view = labels
                .labels
                .slice(s![o[0]..o[0] + sx, o[1]..o[1] + sy, o[2]..o[2] + sz])
                .to_owned();
            writer.write(core.offset, &view)?;
            progress.inc(1);
            Ok::<(), PipelineError>(())
        });

        match result {
            Ok(()) => {
                stage.succeeded = included.len();
                stage.complete();
                progress.finish("exported");
                ctx.checkpoint.mark_done(EXPORT)?;
                Ok(())
            }
            Err(e) => {
                stage.fail();
                progress.abandon("export failed");
                Err(e)
            }
        }
    }

    fn collect(
        &self,
        ctx: &StageContext,
        included: &[u32],
        report: &mut ChannelReport,
    ) -> Result<BTreeSet<u32>, PipelineError> {
        if ctx.checkpoint.is_done(COLLECT) {
            if let Some(buckets) = ctx.checkpoint.load_buckets()? {
                mark_resumed(report, COLLECT);
                return Ok(buckets);
            }
        }

        let params = batches(included, ctx.config.batch_size)
            .into_iter()
            .map(|chunk_ids| JobParams::Collect(CollectJobParams { chunk_ids }))
            .collect();
        let mut barrier = StageBarrier::new(StageKind::Collect, included.iter().map(|&id| u64::from(id)));
        let mut buckets = BTreeSet::new();
        let mut voxels = 0u64;

        let outcomes = self.schedule(ctx, StageKind::Collect, params, report.stage_mut(COLLECT))?;
        for (_, output) in outcomes.outputs {
            if let JobOutput::Collect {
                chunk_ids,
                buckets: touched,
                voxels: n,
            } = output
            {
                for chunk_id in chunk_ids {
                    barrier.record(u64::from(chunk_id), ());
                }
                buckets.extend(touched);
                voxels += n;
            }
        }
        close(barrier, report.stage_mut(COLLECT))?;
        info!("{}: {} object voxels in {} buckets", COLLECT, voxels, buckets.len());

        ctx.checkpoint.save_buckets(&buckets)?;
        ctx.checkpoint.mark_done(COLLECT)?;
        Ok(buckets)
    }

    /// Consolidates the touched buckets and returns the number of objects.
    fn combine(
        &self,
        ctx: &StageContext,
        buckets: &BTreeSet<u32>,
        report: &mut ChannelReport,
    ) -> Result<usize, PipelineError> {
        if ctx.checkpoint.is_done(COMBINE) {
            mark_resumed(report, COMBINE);
            return Ok(ctx.objects.all_objects()?.len());
        }

        let buckets: Vec<u32> = buckets.iter().copied().collect();
        let params = batches(&buckets, ctx.config.combine_stride)
            .into_iter()
            .map(|buckets| JobParams::Combine(CombineJobParams { buckets }))
            .collect();
        let mut barrier = StageBarrier::new(StageKind::Combine, buckets.iter().map(|&b| u64::from(b)));

        let outcomes = self.schedule(ctx, StageKind::Combine, params, report.stage_mut(COMBINE))?;
        for (_, output) in outcomes.outputs {
            if let JobOutput::Combine { objects } = output {
                for (bucket, count) in objects {
                    barrier.record(u64::from(bucket), count);
                }
            }
        }
        let objects: usize = close(barrier, report.stage_mut(COMBINE))?.values().sum();
        ctx.checkpoint.mark_done(COMBINE)?;
        Ok(objects)
    }

    fn schedule(
        &self,
        ctx: &StageContext,
        stage: StageKind,
        batches: Vec<JobParams>,
        report: &mut StageReport,
    ) -> Result<StageOutcomes, PipelineError> {
        let total: usize = batches.iter().map(|b| b.item_count()).sum();
        report.start();
        report.batches = batches.len();
        info!("{}: {} items in {} batches", stage, total, batches.len());

        let progress = StageProgress::new(stage.as_str(), total as u64, self.progress);
        let run_batch = |params: &JobParams| worker::execute(params, ctx);
        let result = StageScheduler::new(self.runner.as_ref(), ctx.config.max_retries).run(
            stage,
            batches,
            &run_batch,
            &progress,
        );

        let outcomes = match result {
            Ok(outcomes) => outcomes,
            Err(e) => {
                report.fail();
                progress.abandon(&e.to_string());
                return Err(e);
            }
        };
        report.succeeded = outcomes.success_count();
        report.failed = outcomes.error_count();
        report.retries = outcomes.retries;
        if outcomes.failures.is_empty() {
            progress.finish("done");
            return Ok(outcomes);
        }

        // Batches the scheduler gave up on are the caller's to handle.
        for (batch_id, e) in &outcomes.failures {
            error!("{}: batch {} gave up: {}", stage, batch_id, e);
        }
        report.fail();
        progress.abandon("incomplete");
        Err(PipelineError::Scheduling {
            stage,
            missing: outcomes.failures.iter().map(|(batch_id, _)| *batch_id).collect(),
            detail: outcomes
                .failures
                .iter()
                .map(|(batch_id, e)| format!("batch {}: {}", batch_id, e))
                .join("; "),
        })
    }
}

fn mark_resumed(report: &mut ChannelReport, name: &str) {
    report.stages.insert(name.to_string(), StageReport::resumed(name));
}

fn close<T>(barrier: StageBarrier<T>, report: &mut StageReport) -> Result<BTreeMap<u64, T>, PipelineError> {
    let stage = barrier.stage();
    match barrier.close() {
        Ok(results) => {
            report.complete();
            info!(
                "{}: {} items done in {}",
                stage,
                results.len(),
                format_duration(report.duration)
            );
            Ok(results)
        }
        Err(e) => {
            report.fail();
            error!("{}", e);
            Err(e)
        }
    }
}

/// Sums per-chunk partner votes over final ids. Pairs that ended up in the
/// same object are dropped.
fn canonical_partners(partners: &PartnerVotes, allocation: &IdAllocation, remap: &RemapTable) -> Vec<PartnerPair> {
    let mut votes: BTreeMap<(u64, u64), u32> = BTreeMap::new();
    for (&chunk_id, chunk_votes) in partners {
        let Some(base) = allocation.base(chunk_id) else {
            continue;
        };
        for (&key, &n) in chunk_votes {
            let (a, b) = split_partner_key(key);
            let a = remap.get(base + u64::from(a));
            let b = remap.get(base + u64::from(b));
            if a != b {
                *votes.entry((a.min(b), a.max(b))).or_default() += n;
            }
        }
    }
    votes
        .into_iter()
        .map(|((a, b), votes)| PartnerPair { a, b, votes })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, ExtractionConfig};
    use crate::engine::{LocalJobRunner, StageState, VoxelSource};
    use crate::extraction::partner_key;
    use crate::grid::VolumeBox;
    use crate::volume::{MemoryLabelStore, MemoryVolume, VolumeError, VolumeReader};
    use ndarray::Array3;

    fn config(dir: &std::path::Path, size: [u32; 3]) -> ExtractionConfig {
        ExtractionConfig::new()
            .with_volume(VolumeBox::new([0, 0, 0], size))
            .with_chunk_size([4, 4, 4])
            .with_channel(ChannelConfig::new("sj", 0.5))
            .with_work_dir(dir.to_path_buf())
            .with_n_buckets(10)
    }

    fn probabilities(size: [u32; 3], voxels: &[[i64; 3]]) -> Arc<MemoryVolume<f32>> {
        let volume = MemoryVolume::new(VolumeBox::new([0, 0, 0], size));
        for &p in voxels {
            volume.set(p, 1.0);
        }
        Arc::new(volume)
    }

    fn context(config: ExtractionConfig, source: VoxelSource) -> StageContext {
        StageContext::new(config, "sj", source, Arc::new(MemoryLabelStore::new())).unwrap()
    }

    fn coordinator() -> Coordinator {
        Coordinator::new(Arc::new(LocalJobRunner::new(2).unwrap()))
    }

    const BAR: [[i64; 3]; 4] = [[2, 1, 1], [3, 1, 1], [4, 1, 1], [5, 1, 1]];

    #[test]
    fn test_object_split_across_chunks_becomes_one() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            config(dir.path(), [8, 4, 4]),
            VoxelSource::Probabilities(probabilities([8, 4, 4], &BAR)),
        );
        let report = coordinator().run_channel(&ctx).unwrap();

        assert_eq!(report.max_label, 2);
        assert_eq!(report.edges, 1);
        assert_eq!(
            ctx.checkpoint.load_edges().unwrap().unwrap(),
            BTreeSet::from([MergeEdge { a: 2, b: 1 }])
        );
        let remap = ctx.remap().unwrap();
        assert_eq!(remap.get(1), 1);
        assert_eq!(remap.get(2), 1);

        assert_eq!(report.object_count, 1);
        let object = ctx.objects.get_object(1).unwrap().unwrap();
        assert_eq!(object.voxel_count, 4);
        assert_eq!(object.chunks, BTreeSet::from([0, 1]));
        assert!(BAR.iter().all(|&p| object.contains(p)));
        assert!(ctx.objects.get_object(2).unwrap().is_none());
        assert!(report.stages.values().all(|s| s.state == StageState::Completed));
    }

    #[test]
    fn test_isolated_object_keeps_its_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut voxels = BAR.to_vec();
        voxels.push([6, 3, 3]);
        let ctx = context(
            config(dir.path(), [8, 4, 4]),
            VoxelSource::Probabilities(probabilities([8, 4, 4], &voxels)),
        );
        let report = coordinator().run_channel(&ctx).unwrap();

        // Chunk 1 sees the bar first, so the lone voxel is its local label 2.
        assert_eq!(report.max_label, 3);
        assert_eq!(report.object_count, 2);
        assert_eq!(ctx.remap().unwrap().get(3), 3);
        let lone = ctx.objects.get_object(3).unwrap().unwrap();
        assert_eq!(lone.voxel_count, 1);
        assert_eq!(lone.chunks, BTreeSet::from([1]));
    }

    struct FailingReader {
        inner: Arc<MemoryVolume<f32>>,
        from_x: i64,
    }

    impl VolumeReader<f32> for FailingReader {
        fn extent(&self) -> VolumeBox {
            self.inner.extent()
        }

        fn read(&self, region: VolumeBox) -> Result<Array3<f32>, VolumeError> {
            if region.offset[0] >= self.from_x {
                return Err(VolumeError::ReadFailed("device gone".to_string()));
            }
            self.inner.read(region)
        }
    }

    #[test]
    fn test_failed_batch_is_reported_and_blocks_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let reader = FailingReader {
            inner: probabilities([8, 4, 4], &BAR),
            from_x: 3,
        };
        let ctx = context(
            config(dir.path(), [8, 4, 4]).with_max_retries(1),
            VoxelSource::Probabilities(Arc::new(reader)),
        );
        let err = coordinator().run_channel(&ctx).unwrap_err();

        match err {
            PipelineError::Scheduling { stage, missing, detail } => {
                assert_eq!(stage, StageKind::Extract);
                assert_eq!(missing, vec![1]);
                assert!(detail.contains("device gone"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(ctx.checkpoint.load_allocation().unwrap().is_none());
        assert!(!ctx.checkpoint.is_done(EXTRACT));
    }

    #[test]
    fn test_excluded_chunks_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let voxels = [[1, 1, 1], [5, 1, 1], [6, 1, 1], [10, 2, 2]];
        let ctx = context(
            config(dir.path(), [12, 4, 4]).with_excluded_chunks(vec![1]),
            VoxelSource::Probabilities(probabilities([12, 4, 4], &voxels)),
        );
        let report = coordinator().run_channel(&ctx).unwrap();

        assert_eq!(report.chunks, 2);
        assert_eq!(report.excluded_chunks, 1);
        assert_eq!(report.edges, 0);
        assert_eq!(report.object_count, 2);
        let ids: Vec<u64> = ctx.objects.all_objects().unwrap().keys().copied().collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_restart_resumes_finished_steps() {
        let dir = tempfile::tempdir().unwrap();
        let source = VoxelSource::Probabilities(probabilities([8, 4, 4], &BAR));
        let first = StageContext::on_disk(config(dir.path(), [8, 4, 4]), "sj", source.clone()).unwrap();
        let report = coordinator().run_channel(&first).unwrap();
        assert_eq!(report.resumed_stages(), 0);

        let second = StageContext::on_disk(config(dir.path(), [8, 4, 4]), "sj", source).unwrap();
        let again = coordinator().run_channel(&second).unwrap();
        assert_eq!(again.object_count, 1);
        assert_eq!(again.max_label, 2);
        assert_eq!(again.resumed_stages(), again.stages.len());
    }

    #[test]
    fn test_reset_drops_previous_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let first = StageContext::on_disk(
            config(dir.path(), [8, 4, 4]),
            "sj",
            VoxelSource::Probabilities(probabilities([8, 4, 4], &[[1, 1, 1], [6, 2, 2]])),
        )
        .unwrap();
        assert_eq!(coordinator().run_channel(&first).unwrap().object_count, 2);

        let second = StageContext::on_disk(
            config(dir.path(), [8, 4, 4]),
            "sj",
            VoxelSource::Probabilities(probabilities([8, 4, 4], &[[1, 1, 1]])),
        )
        .unwrap();
        second.reset().unwrap();
        let report = coordinator().run_channel(&second).unwrap();

        assert_eq!(report.resumed_stages(), 0);
        assert_eq!(report.object_count, 1);
        let ids: Vec<u64> = second.objects.all_objects().unwrap().keys().copied().collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(second.objects.get_object(1).unwrap().unwrap().voxel_count, 1);
    }

    #[test]
    fn test_export_writes_final_ids() {
        let dir = tempfile::tempdir().unwrap();
        let extent = VolumeBox::new([0, 0, 0], [8, 4, 4]);
        let ctx = context(
            config(dir.path(), [8, 4, 4]),
            VoxelSource::Probabilities(probabilities([8, 4, 4], &BAR)),
        );
        let exported = Arc::new(MemoryVolume::<u64>::new(extent));
        coordinator().with_export(exported.clone()).run_channel(&ctx).unwrap();

        let ids = exported.snapshot();
        assert!(BAR.iter().all(|&[x, y, z]| ids[[x as usize, y as usize, z as usize]] == 1));
        assert_eq!(ids.iter().filter(|&&v| v != 0).count(), BAR.len());
    }

    #[test]
    fn test_new_export_target_is_rewritten_on_resume() {
        let dir = tempfile::tempdir().unwrap();
        let extent = VolumeBox::new([0, 0, 0], [8, 4, 4]);
        let source = VoxelSource::Probabilities(probabilities([8, 4, 4], &BAR));
        let first = StageContext::on_disk(config(dir.path(), [8, 4, 4]), "sj", source.clone()).unwrap();
        coordinator()
            .with_export(Arc::new(MemoryVolume::<u64>::new(extent)))
            .run_channel(&first)
            .unwrap();

        let second = StageContext::on_disk(config(dir.path(), [8, 4, 4]), "sj", source).unwrap();
        let kept = Arc::new(MemoryVolume::<u64>::new(extent));
        let report = coordinator().with_export(kept.clone()).run_channel(&second).unwrap();
        assert_eq!(report.stages[EXPORT].state, StageState::Resumed);
        assert!(kept.snapshot().iter().all(|&v| v == 0));

        let created = Arc::new(MemoryVolume::<u64>::new(extent));
        let report = coordinator().with_new_export(created.clone()).run_channel(&second).unwrap();
        assert_eq!(report.stages[EXPORT].state, StageState::Completed);
        let ids = created.snapshot();
        assert!(BAR.iter().all(|&[x, y, z]| ids[[x as usize, y as usize, z as usize]] == 1));
    }

    #[test]
    fn test_from_ids_collects_directly() {
        let dir = tempfile::tempdir().unwrap();
        let extent = VolumeBox::new([0, 0, 0], [8, 4, 4]);
        let ids = MemoryVolume::<u64>::new(extent);
        for &p in &BAR {
            ids.set(p, 77);
        }
        ids.set([0, 3, 3], 5);
        let ctx = context(config(dir.path(), [8, 4, 4]), VoxelSource::Ids(Arc::new(ids)));
        let report = coordinator().run_channel(&ctx).unwrap();

        assert!(report.from_ids);
        assert!(!report.stages.contains_key(EXTRACT));
        assert_eq!(report.object_count, 2);
        assert_eq!(ctx.objects.get_object(77).unwrap().unwrap().voxel_count, 4);
    }

    #[test]
    fn test_partner_votes_follow_final_ids() {
        let allocation = IdAllocation {
            bases: BTreeMap::from([(0, 0), (1, 3)]),
            max_label: 5,
        };
        // Global 5 (chunk 1, local 2) merged into 2, global 4 into 1.
        let remap = resolve(1..=5, [MergeEdge::new(5, 2).unwrap(), MergeEdge::new(4, 1).unwrap()]);
        let partners = BTreeMap::from([
            (0, BTreeMap::from([(partner_key(2, 1), 3), (partner_key(3, 1), 1)])),
            (1, BTreeMap::from([(partner_key(1, 2), 2)])),
        ]);
        let pairs = canonical_partners(&partners, &allocation, &remap);
        assert_eq!(
            pairs,
            vec![
                PartnerPair { a: 1, b: 2, votes: 5 },
                PartnerPair { a: 1, b: 3, votes: 1 },
            ]
        );
    }
}
