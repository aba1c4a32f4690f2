// Mon Oct 19 2026 - Alex

use crate::aggregation::collect;
use crate::engine::context::{StageContext, VoxelSource};
use crate::engine::error::PipelineError;
use crate::engine::params::{
    ApplyJobParams, ChunkJobParams, CollectJobParams, CombineJobParams, JobEnvelope, JobOutput, JobParams,
    JobResultFile, StitchJobParams,
};
use crate::engine::stage::StageKind;
use crate::extraction::LocalExtractor;
use crate::merge::{apply, stitch, OffsetLabels};
use crate::utils::scoped_timer;
use crate::volume::GlobalLabeling;
use log::{debug, error, info};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Runs one batch against a context.
pub fn execute(params: &JobParams, ctx: &StageContext) -> Result<JobOutput, PipelineError> {
    let start = Instant::now();
    let output = match params {
        JobParams::Extract(p) => extract_batch(p, ctx),
        JobParams::Stitch(p) => stitch_batch(p, ctx),
        JobParams::Apply(p) => apply_batch(p, ctx),
        JobParams::Collect(p) => collect_batch(p, ctx),
        JobParams::Combine(p) => combine_batch(p, ctx),
    }?;
    debug!(
        "{} batch of {} items done in {:.2}ms",
        params.stage(),
        params.item_count(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(output)
}

fn extract_batch(params: &ChunkJobParams, ctx: &StageContext) -> Result<JobOutput, PipelineError> {
    let VoxelSource::Probabilities(reader) = &ctx.source else {
        return Err(PipelineError::NotPublished("probability volume"));
    };
    let extractor = LocalExtractor::new(params.settings.clone());
    let mut local_counts = BTreeMap::new();
    let mut partners = BTreeMap::new();

    for &chunk_id in &params.chunk_ids {
        let chunk = ctx.grid.chunk(chunk_id)?;
        let fail = |e: &dyn std::fmt::Display| PipelineError::chunk(chunk_id, StageKind::Extract, e);
        let out = extractor
            .extract_with_partners(chunk, reader.as_ref())
            .map_err(|e| fail(&e))?;
        ctx.labels.put_local(&out.labeling).map_err(|e| fail(&e))?;
        local_counts.insert(chunk_id, out.labeling.local_count);
        if !out.partners.is_empty() {
            partners.insert(chunk_id, out.partners);
        }
    }
    Ok(JobOutput::Extract { local_counts, partners })
}

fn stitch_batch(params: &StitchJobParams, ctx: &StageContext) -> Result<JobOutput, PipelineError> {
    let allocation = ctx.allocation()?;
    let mut edges = BTreeSet::new();

    for pair in &params.pairs {
        let fail = |e: &dyn std::fmt::Display| PipelineError::chunk(pair.lower, StageKind::Stitch, e);
        let base_of = |id: u32| {
            allocation
                .base(id)
                .ok_or_else(|| PipelineError::chunk(id, StageKind::Stitch, "chunk has no id base"))
        };
        let lower = ctx.grid.chunk(pair.lower)?;
        let upper = ctx.grid.chunk(pair.upper)?;
        let labels_lower = ctx.labels.get_local(pair.lower).map_err(|e| fail(&e))?;
        let labels_upper = ctx
            .labels
            .get_local(pair.upper)
            .map_err(|e| PipelineError::chunk(pair.upper, StageKind::Stitch, e))?;

        let found = stitch(
            lower,
            upper,
            OffsetLabels::new(&labels_lower, base_of(pair.lower)?),
            OffsetLabels::new(&labels_upper, base_of(pair.upper)?),
            ctx.grid.stitch_overlap(),
        )?;
        edges.extend(found);
    }
    Ok(JobOutput::Stitch {
        pairs: params.pairs.clone(),
        edges,
    })
}

fn apply_batch(params: &ApplyJobParams, ctx: &StageContext) -> Result<JobOutput, PipelineError> {
    let allocation = ctx.allocation()?;
    let remap = ctx.remap()?;

    for &chunk_id in &params.chunk_ids {
        let fail = |e: &dyn std::fmt::Display| PipelineError::chunk(chunk_id, StageKind::Apply, e);
        let base = allocation.base(chunk_id).ok_or_else(|| fail(&"chunk has no id base"))?;
        let local = ctx.labels.get_local(chunk_id).map_err(|e| fail(&e))?;
        let global = apply(&local, base, &remap);
        ctx.labels.put_final(&global).map_err(|e| fail(&e))?;
    }
    Ok(JobOutput::Apply {
        chunk_ids: params.chunk_ids.clone(),
    })
}

/// Final labels of a chunk: the applied labeling, or the chunk core read
/// straight from the id volume.
fn final_labels(chunk_id: u32, ctx: &StageContext) -> Result<GlobalLabeling, PipelineError> {
    match &ctx.source {
        VoxelSource::Ids(reader) => {
            let core = ctx.grid.chunk(chunk_id)?.core();
            Ok(GlobalLabeling {
                chunk_id,
                window: core,
                labels: reader.read(core)?,
            })
        }
        VoxelSource::Probabilities(_) => Ok(ctx.labels.get_final(chunk_id)?),
    }
}

fn collect_batch(params: &CollectJobParams, ctx: &StageContext) -> Result<JobOutput, PipelineError> {
    let mut buckets = BTreeSet::new();
    let mut voxels = 0;

    for &chunk_id in &params.chunk_ids {
        let fail = |e: &dyn std::fmt::Display| PipelineError::chunk(chunk_id, StageKind::Collect, e);
        let chunk = ctx.grid.chunk(chunk_id)?;
        let labels = final_labels(chunk_id, ctx).map_err(|e| fail(&e))?;
        let found = collect(chunk, &labels, ctx.grid.volume());
        voxels += found.voxel_count();
        buckets.extend(ctx.objects.write_chunk(found).map_err(|e| fail(&e))?);
    }
    Ok(JobOutput::Collect {
        chunk_ids: params.chunk_ids.clone(),
        buckets,
        voxels,
    })
}

fn combine_batch(params: &CombineJobParams, ctx: &StageContext) -> Result<JobOutput, PipelineError> {
    let mut objects = BTreeMap::new();
    for &bucket in &params.buckets {
        let count = ctx
            .objects
            .combine_bucket(bucket)
            .map_err(|e| PipelineError::bucket(bucket, e))?;
        objects.insert(bucket, count);
    }
    Ok(JobOutput::Combine { objects })
}

/// Entry point of a worker process: reads a job envelope, runs it, and
/// writes the result file the submitting runner polls for.
pub fn run_job_file(params_path: &Path, out_path: &Path) -> Result<(), PipelineError> {
    let envelope: JobEnvelope = serde_json::from_slice(&fs::read(params_path)?)?;
    info!(
        "Worker running {} batch {} for channel '{}'",
        envelope.params.stage(),
        envelope.batch_id,
        envelope.env.channel
    );

    let _timer = scoped_timer(&format!("{} batch {}", envelope.params.stage(), envelope.batch_id));
    let result = StageContext::from_env(&envelope.env).and_then(|ctx| execute(&envelope.params, &ctx));
    let file = match result {
        Ok(output) => JobResultFile::Ok(output),
        Err(e) => {
            error!("Batch {} failed: {}", envelope.batch_id, e);
            JobResultFile::Err {
                kind: e.failure_kind(),
                message: e.to_string(),
            }
        }
    };

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = out_path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec(&file)?)?;
    fs::rename(&tmp, out_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, ExtractionConfig};
    use crate::engine::params::WorkerEnv;
    use crate::grid::VolumeBox;
    use crate::volume::{Dtype, RawVolume, VolumeWriter};
    use ndarray::Array3;
    use std::sync::Arc;

    #[test]
    fn test_job_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let extent = VolumeBox::new([0, 0, 0], [8, 4, 4]);
        let input = dir.path().join("input");
        let volume = RawVolume::create(&input, extent, Dtype::F32).unwrap();
        let mut data = Array3::<f32>::zeros((8, 4, 4));
        data[[1, 1, 1]] = 1.0;
        data[[6, 2, 2]] = 1.0;
        volume.write([0, 0, 0], &data).unwrap();
        volume.flush().unwrap();

        let config = ExtractionConfig::new()
            .with_volume(extent)
            .with_chunk_size([4, 4, 4])
            .with_channel(ChannelConfig::new("sj", 0.5))
            .with_work_dir(dir.path().join("work"));
        let ctx = StageContext::on_disk(config.clone(), "sj", VoxelSource::Probabilities(Arc::new(volume))).unwrap();
        let envelope = JobEnvelope {
            batch_id: 0,
            env: WorkerEnv {
                config,
                channel: "sj".to_string(),
                input: Some(input),
                from_ids: false,
            },
            params: JobParams::Extract(ChunkJobParams {
                chunk_ids: vec![0, 1],
                settings: ctx.settings.clone(),
            }),
        };
        let params_path = dir.path().join("storage/job_0.json");
        fs::create_dir_all(params_path.parent().unwrap()).unwrap();
        fs::write(&params_path, serde_json::to_vec(&envelope).unwrap()).unwrap();
        let out_path = dir.path().join("out/job_0.json");

        run_job_file(&params_path, &out_path).unwrap();
        let result: JobResultFile = serde_json::from_slice(&fs::read(&out_path).unwrap()).unwrap();
        match result {
            JobResultFile::Ok(JobOutput::Extract { local_counts, .. }) => {
                assert_eq!(local_counts, BTreeMap::from([(0, 1), (1, 1)]));
            }
            other => panic!("unexpected result {:?}", other),
        }
        // The worker wrote its labels where the coordinator's context reads them.
        assert_eq!(ctx.labels.get_local(1).unwrap().local_count, 1);
    }

    #[test]
    fn test_stitch_needs_published_bases() {
        let dir = tempfile::tempdir().unwrap();
        let extent = VolumeBox::new([0, 0, 0], [8, 4, 4]);
        let config = ExtractionConfig::new()
            .with_volume(extent)
            .with_chunk_size([4, 4, 4])
            .with_channel(ChannelConfig::new("sj", 0.5))
            .with_work_dir(dir.path().to_path_buf());
        let reader = Arc::new(crate::volume::MemoryVolume::<f32>::new(extent));
        let ctx = StageContext::new(
            config,
            "sj",
            VoxelSource::Probabilities(reader),
            Arc::new(crate::volume::MemoryLabelStore::new()),
        )
        .unwrap();
        let pairs = ctx.grid.adjacent_pairs();
        let err = execute(&JobParams::Stitch(StitchJobParams { pairs }), &ctx).unwrap_err();
        assert!(matches!(err, PipelineError::NotPublished(_)));
    }
}
