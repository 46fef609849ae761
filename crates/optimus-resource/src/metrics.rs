use optimus_core::models::resource::Resource;
use prometheus::{IntCounterVec, Opts, Registry};

const LABELS: [&str; 5] = ["project", "namespace", "store", "kind", "status"];

/// Outcome counter for deployed resources.
#[derive(Debug, Clone)]
pub struct DeployMetrics {
    deployed: IntCounterVec,
}

impl DeployMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let deployed = IntCounterVec::new(
            Opts::new(
                "optimus_resource_deploy_total",
                "Resources that reached a terminal state during deploy.",
            ),
            &LABELS,
        )?;
        registry.register(Box::new(deployed.clone()))?;
        Ok(Self { deployed })
    }

    pub(crate) fn record(&self, res: &Resource) {
        self.deployed.with_label_values(&label_values(res)).inc();
    }

    pub fn count(&self, res: &Resource) -> u64 {
        self.deployed.with_label_values(&label_values(res)).get()
    }
}

fn label_values(res: &Resource) -> [&str; 5] {
    [
        res.tenant().project_name().as_str(),
        res.tenant().namespace_name().as_str(),
        res.store().as_str(),
        res.kind().as_str(),
        res.status().as_str(),
    ]
}
