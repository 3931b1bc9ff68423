use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// 样本来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// 健康检查探测
    Probe,
    /// 真实业务调用
    Call,
}

/// 一次探测或调用的结果记录，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyMetric {
    pub endpoint_id: String,
    pub latency_ms: u64,
    /// Unix毫秒时间戳
    pub timestamp_ms: i64,
    pub success: bool,
    pub source: SampleSource,
}

impl LatencyMetric {
    pub fn new(
        endpoint_id: impl Into<String>,
        latency_ms: u64,
        success: bool,
        source: SampleSource,
    ) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            latency_ms,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            success,
            source,
        }
    }
}

/// 单个端点的聚合统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct EndpointMetrics {
    pub samples: usize,
    pub successes: usize,
    pub average_latency_ms: Option<f64>,
}

impl EndpointMetrics {
    pub fn success_rate(&self) -> Option<f64> {
        if self.samples == 0 {
            None
        } else {
            Some(self.successes as f64 / self.samples as f64)
        }
    }
}

/// 整体聚合统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSummary {
    pub window_samples: usize,
    pub total_recorded: u64,
    pub probe_samples: u64,
    pub call_samples: u64,
    pub average_latency_ms: Option<f64>,
    pub success_rate: Option<f64>,
}

/// 指标记录器
///
/// 在有界的滚动窗口中保存延迟样本（先进先出），只读地提供聚合统计。
/// 记录样本不影响控制流程
pub struct MetricsRecorder {
    window: usize,
    samples: Mutex<VecDeque<LatencyMetric>>,
    total_recorded: AtomicU64,
    probe_samples: AtomicU64,
    call_samples: AtomicU64,
}

impl MetricsRecorder {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: Mutex::new(VecDeque::with_capacity(window)),
            total_recorded: AtomicU64::new(0),
            probe_samples: AtomicU64::new(0),
            call_samples: AtomicU64::new(0),
        }
    }

    /// 记录一个样本，窗口满时丢弃最旧的样本
    pub fn record(&self, metric: LatencyMetric) {
        match metric.source {
            SampleSource::Probe => self.probe_samples.fetch_add(1, Ordering::Relaxed),
            SampleSource::Call => self.call_samples.fetch_add(1, Ordering::Relaxed),
        };
        self.total_recorded.fetch_add(1, Ordering::Relaxed);

        let mut samples = self.samples.lock();
        while samples.len() >= self.window {
            samples.pop_front();
        }
        samples.push_back(metric);
    }

    /// 获取窗口内所有样本的拷贝（按时间先后）
    pub fn samples(&self) -> Vec<LatencyMetric> {
        self.samples.lock().iter().cloned().collect()
    }

    /// 获取指定端点的样本
    pub fn samples_for(&self, endpoint_id: &str) -> Vec<LatencyMetric> {
        self.samples
            .lock()
            .iter()
            .filter(|m| m.endpoint_id == endpoint_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// 平均延迟，只统计成功样本（失败样本记录的是哨兵值）
    pub fn average_latency_ms(&self) -> Option<f64> {
        let samples = self.samples.lock();
        average_success_latency(samples.iter())
    }

    /// 窗口内的成功率
    pub fn success_rate(&self) -> Option<f64> {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return None;
        }
        let successes = samples.iter().filter(|m| m.success).count();
        Some(successes as f64 / samples.len() as f64)
    }

    /// 单个端点的聚合统计
    pub fn endpoint_metrics(&self, endpoint_id: &str) -> EndpointMetrics {
        let samples = self.samples.lock();
        let matching: Vec<&LatencyMetric> = samples
            .iter()
            .filter(|m| m.endpoint_id == endpoint_id)
            .collect();

        EndpointMetrics {
            samples: matching.len(),
            successes: matching.iter().filter(|m| m.success).count(),
            average_latency_ms: average_success_latency(matching.into_iter()),
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            window_samples: self.len(),
            total_recorded: self.total_recorded.load(Ordering::Relaxed),
            probe_samples: self.probe_samples.load(Ordering::Relaxed),
            call_samples: self.call_samples.load(Ordering::Relaxed),
            average_latency_ms: self.average_latency_ms(),
            success_rate: self.success_rate(),
        }
    }
}

fn average_success_latency<'a>(samples: impl Iterator<Item = &'a LatencyMetric>) -> Option<f64> {
    let (total, count) = samples
        .filter(|m| m.success)
        .fold((0u64, 0u64), |(total, count), m| {
            (total.saturating_add(m.latency_ms), count + 1)
        });
    if count == 0 {
        None
    } else {
        Some(total as f64 / count as f64)
    }
}
