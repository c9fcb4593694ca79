//! Prompt templates for the three Gemini calls in the matching pipeline.

pub fn jd_verify_prompt(text: &str) -> String {
    format!(
        r#"You are a recruiter who can understand the JD of a job.
You are given a text structure from which you have to understand whether it is a JD or not.
Analyze the text and respond in the JSON format below.

Text Structure:
{text}

Response Format:

{{
  "is_jd": true,
  "reason": ""
}}

OR

{{
  "is_jd": false,
  "reason": "<Reason why it's not a JD>"
}}"#
    )
}

pub fn jd_extract_prompt(jd_url: &str) -> String {
    format!(
        r#"You are a smart machine that understands and extracts contents from webpages.
Navigate to the provided URL: {jd_url} and extract the Job Description (JD).

Rules:
> If any popup / modal / dialog is found on the screen, strictly close it!
> If you don't find the webpage to be the JD of a job you can return an error.
> Extract only the required job description; strictly do not extract unwanted things like about the company etc.

Strictly follow this JSON format output:

Success:
{{
  "message": "SUCCESS",
  "data": "<Extracted Content Of the JD>"
}}

Error:
{{
  "message": "ERROR",
  "data": "<Error Message>"
}}"#
    )
}

pub fn score_prompt(jd: &str) -> String {
    format!(
        r#"You are an ATS machine that judges candidates based on JDs provided to you.
Below is the JD of the job.

{jd}

Do the following tasks taking reference from the above JD and the attached resume file:

> Analyse the candidate resume given as an input
> Check if the candidate is fit for the job or not.
> Rate the candidate based on the structure below.

Note: assess the score in this manner -> score < 40 = POOR, 40..70 = AVERAGE, 70..90 = GOOD, above 90 = GREAT

Respond with exactly this JSON shape:
{{
  "score": 82,
  "matching_skills": ["React", "Redux"],
  "missing_skills": ["Microfrontend", "PWA"],
  "explanation": "2-3 lines telling the candidate why they were rated this way."
}}"#
    )
}
