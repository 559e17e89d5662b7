//! Shared batch plan fixture for behavioural tests.

use batchwatch::provision::BatchPlan;

use crate::test_constants::LABEL_PREFIX;

pub fn batch_plan() -> BatchPlan {
    BatchPlan {
        label_prefix: String::from(LABEL_PREFIX),
        app: String::from("illumina_dragen"),
        machine: String::from("n1-standard-8"),
        priority: String::from("normal"),
        service_account: String::from("default"),
        meter_image: String::from("meter:1"),
        meter_command: String::from("/usr/local/bin/entrypoint"),
        meter_args: vec![
            String::from("meter"),
            String::from("--api-host"),
            String::from("https://jobs.test"),
            String::from("--license-id"),
            String::from("lic-1"),
        ],
        remote_command: String::from("/opt/edico/bin/dragen"),
        encoded_args: String::from("LXIgL3JlZg=="),
    }
}
