use crate::remote::ComputeClient;

/// Deletes a job if it exists. Deleting the pool job also removes its auto pool.
pub async fn delete_job(client: &dyn ComputeClient, job_id: &str) -> crate::Result<()> {
    match client.get_job(job_id).await {
        Ok(_) => {}
        Err(error) if error.is_not_found() => {
            log::debug!("Job {job_id} does not exist, nothing to delete");
            return Ok(());
        }
        Err(error) => return Err(error),
    }

    log::info!("Deleting job {job_id}");
    match client.delete_job(job_id).await {
        Ok(()) => {}
        // Removed by someone else in the meantime
        Err(error) if error.is_not_found() => {}
        Err(error) => return Err(error),
    }
    log::info!("Job {job_id} is deleted");
    Ok(())
}
