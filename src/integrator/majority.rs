//! Majority-vote baseline.
//!
//! The consensus label of an instance is 1 when at least as many classifiers
//! output 1 as output 0. A classifier's error rate in a domain is the share of
//! its outputs that disagree with the consensus.

use tracing::debug;

use crate::data::{
    ErrorRate, ErrorRates, IntegratedData, IntegratedInstance, PredictedInstance,
};

use super::index::ObservationIndex;
use super::{Integrator, IntegratorError};

pub struct MajorityVoteIntegrator {
    index: ObservationIndex,
    results: Option<(ErrorRates, IntegratedData)>,
}

impl MajorityVoteIntegrator {
    pub fn new(data: &[PredictedInstance]) -> Result<Self, IntegratorError> {
        Ok(Self {
            index: ObservationIndex::build(data)?,
            results: None,
        })
    }

    fn compute(&self) -> (ErrorRates, IntegratedData) {
        let classifiers = self.index.number_of_classifiers();
        let mut error_rates = Vec::new();
        let mut integrated = Vec::new();
        for domain in &self.index.domains {
            let mut disagreements = vec![0u32; classifiers];
            let mut observations = vec![0u32; classifiers];
            for i in 0..domain.number_of_instances() {
                let obs = domain.instance(i);
                let positives = obs.iter().filter(|o| o.output == 1).count();
                let label = u8::from(2 * positives >= obs.len());
                for o in obs {
                    observations[o.classifier] += 1;
                    if o.output != label {
                        disagreements[o.classifier] += 1;
                    }
                }
                integrated.push(IntegratedInstance {
                    id: *domain.instances.key(i),
                    label: domain.label.clone(),
                    value: f64::from(label),
                });
            }
            // Classifiers that never saw this domain get no row.
            for (j, &function_id) in self.index.classifiers.keys().iter().enumerate() {
                if observations[j] == 0 {
                    continue;
                }
                error_rates.push(ErrorRate {
                    label: domain.label.clone(),
                    function_id,
                    value: f64::from(disagreements[j]) / f64::from(observations[j]),
                });
            }
        }
        debug!(
            domains = self.index.number_of_domains(),
            instances = integrated.len(),
            "majority vote computed"
        );
        (ErrorRates::new(error_rates), IntegratedData::new(integrated))
    }

    fn results(&mut self, force: bool) -> &(ErrorRates, IntegratedData) {
        let results = match self.results.take() {
            Some(results) if !force => results,
            _ => self.compute(),
        };
        self.results.insert(results)
    }
}

impl Integrator for MajorityVoteIntegrator {
    fn error_rates(&mut self, force: bool) -> Result<&ErrorRates, IntegratorError> {
        Ok(&self.results(force).0)
    }

    fn integrated_data(&mut self, force: bool) -> Result<&IntegratedData, IntegratorError> {
        Ok(&self.results(force).1)
    }
}
