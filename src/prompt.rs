use crate::config::Config;
use anyhow::Result;
use serde_json::Value;

pub fn chunk_analysis_prompt(cfg: &Config, index: usize, total: usize, content: &str) -> String {
    format!(
        "The following is {subject}.\n\
         Analyze this data and provide the following information:\n\
         \n\
         1. The 5 most active users and their message frequency\n\
         2. Main conversation topics and keywords\n\
         3. {product_cap} features or problems users mention frequently\n\
         4. User sentiment analysis (ratio of positive/negative/neutral opinions)\n\
         5. Suggestions for improving the {product}\n\
         \n\
         This data is one part of the full log (chunk {index}/{total}).\n\
         \n\
         CSV data:\n\
         {content}\n\
         \n\
         Provide the analysis result in JSON format.\n",
        subject = cfg.prompt.subject,
        product = cfg.prompt.product,
        product_cap = capitalize(&cfg.prompt.product),
    )
}

/// `results` are embedded as a pretty-printed JSON array, in chunk order.
pub fn aggregation_prompt(cfg: &Config, results: &[Value]) -> Result<String> {
    let payload = serde_json::to_string_pretty(results)?;
    Ok(format!(
        "The following are the results of analyzing {subject}, split into several parts.\n\
         Combine these analysis results and provide overall insights:\n\
         \n\
         {payload}\n\
         \n\
         Write a combined report that includes the following:\n\
         \n\
         1. The most active users and their influence\n\
         2. Main conversation topics and trends\n\
         3. User satisfaction with the {product} and complaints\n\
         4. User activity patterns over time\n\
         5. Improvements to suggest to the {product}'s developers\n\
         \n\
         Provide the combined analysis result in JSON format.\n",
        subject = cfg.prompt.subject,
        product = cfg.prompt.product,
    ))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
